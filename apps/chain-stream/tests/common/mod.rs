//! Shared harness for the integration tests: a running bus, a publisher fed
//! through an in-process channel, and both gRPC services on an ephemeral
//! port.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chain_stream::{
    ChainStreamServer, ChainStreamServerConfig, Decoder, EventBus, FileMarketStore,
    MarketMetadata, Publisher, RawEvent, StaticGasPrice, StreamEvents,
    domain::decoder::topics,
    proto_v1, proto_v2,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};

/// Gas price reported by the harness.
pub const GAS_PRICE: &str = "160000000";

/// Base64 of a 20-byte account address (all bytes 0x01).
pub const ACCOUNT_BYTES: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQE=";

/// Bech32 rendering of [`ACCOUNT_BYTES`].
pub const ACCOUNT: &str = "inj1qyqszqgpqyqszqgpqyqszqgpqyqszqgpc6k6ly";

/// Hex rendering of the base64 subaccount `AQ==`.
pub fn subaccount_one() -> String {
    format!("0x{}01", "0".repeat(62))
}

pub struct Harness {
    pub addr: SocketAddr,
    pub bus: Arc<EventBus>,
    pub publisher: Arc<Publisher>,
    pub server: ChainStreamServer,
    pub events: mpsc::Sender<StreamEvents>,
    pub shutdown: CancellationToken,
    inbound: Mutex<Option<mpsc::Receiver<StreamEvents>>>,
}

impl Harness {
    /// Build the pipeline and serve gRPC. The publisher is not running yet.
    pub async fn new(markets: Vec<MarketMetadata>, publisher_capacity: usize) -> Self {
        let bus = Arc::new(EventBus::new(16));
        bus.start().unwrap();
        let publisher = Arc::new(Publisher::new(
            Decoder::default(),
            Arc::clone(&bus),
            publisher_capacity,
        ));
        let shutdown = CancellationToken::new();
        let server = ChainStreamServer::new(
            ChainStreamServerConfig::default(),
            Arc::clone(&bus),
            Arc::new(FileMarketStore::from_markets(markets)),
            Arc::new(StaticGasPrice::new(GAS_PRICE)),
            shutdown.clone(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let services = server.clone();
        let grpc_shutdown = shutdown.clone();
        tokio::spawn(async move {
            Server::builder()
                .add_service(proto_v1::stream_server::StreamServer::new(services.clone()))
                .add_service(proto_v2::stream_server::StreamServer::new(services))
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::TcpListenerStream::new(listener),
                    grpc_shutdown.cancelled_owned(),
                )
                .await
                .unwrap();
        });

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (events, inbound) = mpsc::channel(64);
        Self {
            addr,
            bus,
            publisher,
            server,
            events,
            shutdown,
            inbound: Mutex::new(Some(inbound)),
        }
    }

    /// Harness with a running publisher.
    pub async fn running(markets: Vec<MarketMetadata>) -> Self {
        let harness = Self::new(markets, 16).await;
        harness.run_publisher();
        harness
    }

    pub fn run_publisher(&self) {
        let inbound = self.inbound.lock().take().expect("publisher already running");
        self.publisher.run(inbound).unwrap();
    }

    pub async fn v1_client(&self) -> proto_v1::stream_client::StreamClient<Channel> {
        proto_v1::stream_client::StreamClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    pub async fn v2_client(&self) -> proto_v2::stream_client::StreamClient<Channel> {
        proto_v2::stream_client::StreamClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    /// Wait until `count` subscribers are registered on the bus.
    pub async fn wait_for_subscribers(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.bus.subscriber_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscribers did not register");
    }

    /// Publish one complete block.
    pub async fn publish_block(&self, height: u64, events: Vec<RawEvent>) {
        self.events.send(batch(height, events, true)).await.unwrap();
    }
}

pub fn batch(height: u64, events: Vec<RawEvent>, flush: bool) -> StreamEvents {
    let block_time = Utc.timestamp_millis_opt(1_700_000_000_000 + i64::try_from(height).unwrap()).unwrap();
    StreamEvents::new(height, block_time, events, flush)
}

pub fn spot_order_json(price: &str, quantity: &str, fillable: &str) -> String {
    format!(
        r#"{{"order_info":{{"subaccount_id":"{}","fee_recipient":"inj1fee","price":"{price}","quantity":"{quantity}","cid":"c1"}},"order_type":"BUY","fillable":"{fillable}","trigger_price":null,"order_hash":"q80="}}"#,
        subaccount_one()
    )
}

/// A new-spot-orders event with a single buy order.
pub fn new_spot_order(market_id: &str, price: &str, quantity: &str, fillable: &str) -> RawEvent {
    RawEvent::new(topics::NEW_SPOT_ORDERS)
        .with_attribute("market_id", format!("\"{market_id}\""))
        .with_attribute(
            "buy_orders",
            format!("[{}]", spot_order_json(price, quantity, fillable)),
        )
        .with_attribute("sell_orders", "[]")
}

/// A spot execution with one trade by subaccount `AQ==`.
pub fn spot_trade(market_id: &str) -> RawEvent {
    RawEvent::new(topics::BATCH_SPOT_EXECUTION)
        .with_attribute("market_id", format!("\"{market_id}\""))
        .with_attribute("is_buy", "true")
        .with_attribute("executionType", "\"LimitMatchNewOrder\"")
        .with_attribute(
            "trades",
            format!(
                r#"[{{"quantity":"1","price":"2","subaccount_id":"AQ==","fee":"0.1","order_hash":"Ag==","fee_recipient_address":"{ACCOUNT_BYTES}","cid":"t"}}]"#
            ),
        )
}

/// A bank balance update per `(base64 address, amount)` pair, in `inj`.
pub fn bank_balances(updates: &[(&str, &str)]) -> RawEvent {
    let entries: Vec<String> = updates
        .iter()
        .map(|(addr, amount)| format!(r#"{{"addr":"{addr}","denom":"inj","amt":"{amount}"}}"#))
        .collect();
    RawEvent::new(topics::BANK_BALANCES)
        .with_attribute("balance_updates", format!("[{}]", entries.join(",")))
}

pub fn coinbase_price(symbol: &str, price: &str) -> RawEvent {
    RawEvent::new(topics::COINBASE_PRICE)
        .with_attribute("symbol", format!("\"{symbol}\""))
        .with_attribute("price", format!("\"{price}\""))
}
