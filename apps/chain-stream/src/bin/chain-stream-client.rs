//! Chain Stream Client
//!
//! Subscribes to every record type and prints each response as one JSON
//! line.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chain-stream-client -- [ADDR] [--v1]
//! ```
//!
//! `ADDR` defaults to `http://localhost:9999`. `--v1` requests the legacy
//! fixed-point stream instead of v2.

use chain_stream::StreamRequest;
use chain_stream::infrastructure::grpc::proto::chainstream::{v1, v2};
use futures::{Stream, StreamExt};
use serde::Serialize;

const DEFAULT_ADDR: &str = "http://localhost:9999";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut addr = DEFAULT_ADDR.to_string();
    let mut legacy = false;
    for arg in std::env::args().skip(1) {
        if arg == "--v1" {
            legacy = true;
        } else {
            addr = arg;
        }
    }

    let request = StreamRequest::full();

    if legacy {
        let mut client = v1::stream_client::StreamClient::connect(addr).await?;
        let stream = client
            .stream(v1::StreamRequest::from(&request))
            .await?
            .into_inner();
        print_responses(stream).await
    } else {
        let mut client = v2::stream_client::StreamClient::connect(addr).await?;
        let stream = client
            .stream_v2(v2::StreamRequest::from(&request))
            .await?
            .into_inner();
        print_responses(stream).await
    }
}

async fn print_responses<S, T>(mut stream: S) -> anyhow::Result<()>
where
    S: Stream<Item = Result<T, tonic::Status>> + Unpin,
    T: Serialize,
{
    while let Some(response) = stream.next().await {
        println!("{}", serde_json::to_string(&response?)?);
    }
    Ok(())
}
