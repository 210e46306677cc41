//! Block Publisher
//!
//! Turns the execution engine's per-block event batches into published
//! [`ResponseBuffer`]s.
//!
//! Two tasks run while the publisher is up:
//!
//! - **ingest** moves batches from the engine channel into a bounded internal
//!   channel without waiting. A full internal channel means the pipeline can
//!   no longer keep up; the publisher reports a bus error and stops itself
//!   rather than drop chain events.
//! - **process** decodes every event of a batch into the open buffer and, on
//!   the block's flush batch, publishes the buffer and opens a fresh one.
//!
//! A decode failure is published as a bus error and skipped; the rest of the
//! batch is still accumulated.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::buffer::{BufferState, ResponseBuffer};
use crate::domain::decoder::{DecodeError, Decoder};
use crate::domain::events::StreamEvents;
use crate::infrastructure::bus::{BusError, BusMessage, EventBus};
use crate::infrastructure::metrics;

/// Default internal channel depth.
pub const DEFAULT_PUBLISHER_CAPACITY: usize = 100;

/// Message published when the internal channel overflows.
pub const OVERFLOW_MESSAGE: &str = "chain stream event buffer overflow";

/// Publisher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// Constructed, not yet running.
    Created,
    /// Tasks are running.
    Running,
    /// Stopped; cannot be restarted.
    Stopped,
}

impl PublisherState {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Publisher errors.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// `run` called twice.
    #[error("publisher already running")]
    AlreadyRunning,

    /// `run` called after `stop`.
    #[error("publisher has been stopped")]
    Stopped,

    /// The event bus could not be started.
    #[error("failed to start event bus: {0}")]
    Bus(#[from] BusError),
}

/// Decodes engine batches and publishes one buffer per block.
pub struct Publisher {
    decoder: Decoder,
    bus: Arc<EventBus>,
    capacity: usize,
    state: Mutex<PublisherState>,
    open: RwLock<Arc<ResponseBuffer>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Create a publisher whose internal channel holds `capacity` batches.
    #[must_use]
    pub fn new(decoder: Decoder, bus: Arc<EventBus>, capacity: usize) -> Self {
        Self {
            decoder,
            bus,
            capacity: capacity.max(1),
            state: Mutex::new(PublisherState::Created),
            open: RwLock::new(Arc::new(ResponseBuffer::new())),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PublisherState {
        *self.state.lock()
    }

    /// The bus blocks are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The buffer currently being accumulated.
    #[must_use]
    pub fn open_buffer(&self) -> Arc<ResponseBuffer> {
        Arc::clone(&self.open.read())
    }

    /// Start the bus and the ingest and process tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::AlreadyRunning`] or
    /// [`PublisherError::Stopped`] outside the `Created` state, and
    /// [`PublisherError::Bus`] if the bus fails to start.
    pub fn run(
        self: &Arc<Self>,
        inbound: mpsc::Receiver<StreamEvents>,
    ) -> Result<(), PublisherError> {
        {
            let mut state = self.state.lock();
            match *state {
                PublisherState::Running => return Err(PublisherError::AlreadyRunning),
                PublisherState::Stopped => return Err(PublisherError::Stopped),
                PublisherState::Created => {}
            }
            if !self.bus.is_running() {
                self.bus.start()?;
            }
            *state = PublisherState::Running;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let ingest = tokio::spawn(Arc::clone(self).ingest(inbound, tx));
        let process = tokio::spawn(Arc::clone(self).process(rx));
        self.tasks.lock().extend([ingest, process]);

        tracing::info!(capacity = self.capacity, "Publisher started");
        Ok(())
    }

    /// Stop the tasks and the bus. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == PublisherState::Stopped {
                return;
            }
            *state = PublisherState::Stopped;
        }

        self.shutdown.cancel();
        if let Err(e) = self.bus.stop() {
            tracing::debug!(error = %e, "Event bus already stopped");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Publisher task ended abnormally");
            }
        }
        tracing::info!("Publisher stopped");
    }

    async fn ingest(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<StreamEvents>,
        tx: mpsc::Sender<StreamEvents>,
    ) {
        loop {
            let batch = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                batch = inbound.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        tracing::info!("Engine event channel closed");
                        break;
                    }
                },
            };

            match tx.try_send(batch) {
                Ok(()) => {}
                Err(TrySendError::Full(batch)) => {
                    tracing::error!(
                        height = batch.height,
                        capacity = self.capacity,
                        "Publisher buffer overflow, stopping"
                    );
                    metrics::record_buffer_overflow();
                    self.publish(BusMessage::Error(OVERFLOW_MESSAGE.to_string()));

                    // stop() joins this task, so it has to run elsewhere.
                    let publisher = Arc::clone(&self);
                    tokio::spawn(async move { publisher.stop().await });
                    break;
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
    }

    async fn process(self: Arc<Self>, mut rx: mpsc::Receiver<StreamEvents>) {
        self.open_buffer().clear();

        loop {
            let batch = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.process_batch(&batch);
        }
    }

    fn process_batch(&self, batch: &StreamEvents) {
        let open = self.open_buffer();

        let errors: Vec<DecodeError> = open.write(|state| {
            state.block_height = batch.height;
            let mut errors = Vec::new();
            for event in &batch.events {
                match self.decoder.decode(event) {
                    Ok(records) => {
                        if self.decoder.handles(&event.kind) {
                            metrics::record_event_decoded(&event.kind);
                        }
                        for record in records {
                            state.insert(record);
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
            if batch.flush {
                state.block_time = batch.block_time;
            }
            errors
        });

        for e in errors {
            tracing::warn!(height = batch.height, topic = e.topic(), error = %e, "Failed to decode event");
            metrics::record_decode_error(e.topic());
            self.publish(BusMessage::Error(e.to_string()));
        }

        if batch.flush {
            *self.open.write() = Arc::new(ResponseBuffer::new());
            tracing::debug!(
                height = batch.height,
                records = open.read(BufferState::record_count),
                "Publishing block"
            );
            metrics::record_block_published(batch.height);
            self.publish(BusMessage::Block(open));
        }
    }

    fn publish(&self, message: BusMessage) {
        if let Err(e) = self.bus.publish(message) {
            tracing::debug!(error = %e, "Dropping message for stopped bus");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::time::timeout;

    use super::*;
    use crate::domain::decoder::topics;
    use crate::domain::events::RawEvent;
    use crate::infrastructure::bus::{BusEvent, BusSubscription};

    fn coinbase(symbol: &str, price: &str) -> RawEvent {
        RawEvent::new(topics::COINBASE_PRICE)
            .with_attribute("symbol", format!("\"{symbol}\""))
            .with_attribute("price", format!("\"{price}\""))
    }

    fn batch(height: u64, events: Vec<RawEvent>, flush: bool) -> StreamEvents {
        let time = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        StreamEvents::new(height, time, events, flush)
    }

    fn setup(capacity: usize) -> (Arc<Publisher>, BusSubscription) {
        let bus = Arc::new(EventBus::new(16));
        bus.start().unwrap();
        let sub = bus.subscribe("test").unwrap();
        let publisher = Arc::new(Publisher::new(Decoder::default(), bus, capacity));
        (publisher, sub)
    }

    async fn next(sub: &mut BusSubscription) -> BusEvent {
        timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for bus message")
    }

    #[tokio::test]
    async fn publishes_buffer_on_flush() {
        let (publisher, mut sub) = setup(8);
        let (tx, rx) = mpsc::channel(8);
        publisher.run(rx).unwrap();

        tx.send(batch(5, vec![coinbase("BTC", "100")], false)).await.unwrap();
        tx.send(batch(5, vec![coinbase("ETH", "10")], true)).await.unwrap();

        let BusEvent::Message(BusMessage::Block(buffer)) = next(&mut sub).await else {
            panic!("expected block");
        };
        buffer.read(|s| {
            assert_eq!(s.block_height, 5);
            assert_eq!(s.block_time.timestamp_millis(), 1_700_000_000_000);
            assert_eq!(s.oracle_prices_by_symbol.len(), 2);
        });
        assert!(!Arc::ptr_eq(&buffer, &publisher.open_buffer()));

        publisher.stop().await;
    }

    #[tokio::test]
    async fn decode_error_is_published_and_batch_continues() {
        let (publisher, mut sub) = setup(8);
        let (tx, rx) = mpsc::channel(8);
        publisher.run(rx).unwrap();

        let broken = RawEvent::new(topics::COINBASE_PRICE).with_attribute("symbol", "\"BTC\"");
        tx.send(batch(7, vec![broken, coinbase("ETH", "10")], true))
            .await
            .unwrap();

        let BusEvent::Message(BusMessage::Error(text)) = next(&mut sub).await else {
            panic!("expected error");
        };
        assert!(text.contains("price"));

        let BusEvent::Message(BusMessage::Block(buffer)) = next(&mut sub).await else {
            panic!("expected block");
        };
        let symbols: Vec<String> =
            buffer.read(|s| s.oracle_prices_by_symbol.keys().cloned().collect());
        assert_eq!(symbols, vec!["ETH".to_string()]);

        publisher.stop().await;
    }

    #[tokio::test]
    async fn overflow_publishes_error_and_stops() {
        let (publisher, mut sub) = setup(1);
        let (tx, rx) = mpsc::channel(16);
        for height in 1..=8 {
            tx.send(batch(height, vec![], false)).await.unwrap();
        }

        publisher.run(rx).unwrap();

        loop {
            match next(&mut sub).await {
                BusEvent::Message(BusMessage::Error(text)) => {
                    assert!(text.contains("buffer overflow"));
                    break;
                }
                BusEvent::Message(BusMessage::Block(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(next(&mut sub).await, BusEvent::Closed));
        assert_eq!(publisher.state(), PublisherState::Stopped);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let (publisher, _sub) = setup(4);
        assert_eq!(publisher.state(), PublisherState::Created);

        let (_tx, rx) = mpsc::channel(4);
        publisher.run(rx).unwrap();
        assert_eq!(publisher.state(), PublisherState::Running);

        let (_tx2, rx2) = mpsc::channel(4);
        assert!(matches!(publisher.run(rx2), Err(PublisherError::AlreadyRunning)));

        publisher.stop().await;
        publisher.stop().await;
        assert_eq!(publisher.state(), PublisherState::Stopped);
        assert!(!publisher.bus().is_running());

        let (_tx3, rx3) = mpsc::channel(4);
        assert!(matches!(publisher.run(rx3), Err(PublisherError::Stopped)));
    }
}
