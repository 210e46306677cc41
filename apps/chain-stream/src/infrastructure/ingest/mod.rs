//! Engine Ingest Listener
//!
//! Accepts TCP connections from the execution engine. Each connection
//! carries newline-delimited JSON [`StreamEvents`] batches, which are
//! forwarded in order into the publisher's inbound channel.
//!
//! Malformed lines are logged and skipped; the connection stays open.

use std::net::SocketAddr;

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::domain::events::StreamEvents;

/// Longest accepted line, in bytes.
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Ingest listener errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Failed to bind the listen address.
    #[error("failed to bind ingest listener to {addr}: {source}")]
    Bind {
        /// Listen address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from a connection failed.
    #[error("ingest connection error: {0}")]
    Read(#[from] LinesCodecError),

    /// The publisher no longer accepts batches.
    #[error("publisher inbound channel closed")]
    ChannelClosed,
}

/// TCP listener feeding engine batches to the publisher.
#[derive(Debug)]
pub struct IngestListener {
    listener: TcpListener,
    tx: mpsc::Sender<StreamEvents>,
}

impl IngestListener {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, tx: mpsc::Sender<StreamEvents>) -> Result<Self, IngestError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| IngestError::Bind { addr, source })?;
        Ok(Self { listener, tx })
    }

    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(addr = ?self.local_addr(), "Engine ingest listening");

        loop {
            let accepted = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let tx = self.tx.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, tx, shutdown).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept ingest connection");
                }
            }
        }

        tracing::info!("Engine ingest stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<StreamEvents>,
    shutdown: CancellationToken,
) {
    tracing::info!(peer = %peer, "Engine connected");

    let result = tokio::select! {
        biased;
        () = shutdown.cancelled() => Ok(0),
        result = forward_batches(stream, &tx) => result,
    };

    match result {
        Ok(batches) => tracing::info!(peer = %peer, batches, "Engine disconnected"),
        Err(e) => tracing::error!(peer = %peer, error = %e, "Engine connection failed"),
    }
}

/// Forward every well-formed line of `reader` into `tx`.
///
/// Returns the number of forwarded batches once the reader is exhausted.
///
/// # Errors
///
/// Returns [`IngestError::Read`] on an I/O or framing failure and
/// [`IngestError::ChannelClosed`] once the publisher stops accepting.
pub async fn forward_batches<R>(reader: R, tx: &mpsc::Sender<StreamEvents>) -> Result<u64, IngestError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut forwarded = 0;

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let batch: StreamEvents = match serde_json::from_str(&line) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed engine batch");
                continue;
            }
        };

        tracing::trace!(height = batch.height, events = batch.events.len(), flush = batch.flush, "Engine batch received");
        tx.send(batch).await.map_err(|_| IngestError::ChannelClosed)?;
        forwarded += 1;
    }

    Ok(forwarded)
}
