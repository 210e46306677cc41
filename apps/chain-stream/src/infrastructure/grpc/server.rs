//! gRPC Streaming Server Implementation
//!
//! Implements the v1 `Stream` and v2 `StreamV2` services. Both share one
//! delivery loop per subscription; they differ only in how a filtered
//! response is encoded for the wire.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use super::convert::response_to_v1;
use super::proto::chainstream::v1::{self, stream_server::Stream as StreamV1Service};
use super::proto::chainstream::v2::{self, stream_server::Stream as StreamV2Service};
use crate::application::ports::{GasPriceSource, MarketStore};
use crate::application::services::CachedMarketFinder;
use crate::domain::request::StreamRequest;
use crate::domain::response::StreamResponse;
use crate::infrastructure::bus::{BusEvent, BusMessage, BusSubscription, EventBus};
use crate::infrastructure::metrics::{self, StreamVersion};

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Receiving end of one subscription's responses.
pub type ResponseReceiver<T> = mpsc::Receiver<Result<T, Status>>;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the gRPC streaming server.
#[derive(Debug, Clone)]
pub struct ChainStreamServerConfig {
    /// Responses buffered between a delivery loop and its transport.
    pub outbound_buffer: usize,
}

impl Default for ChainStreamServerConfig {
    fn default() -> Self {
        Self { outbound_buffer: 16 }
    }
}

// =============================================================================
// Encoders
// =============================================================================

#[async_trait]
trait ResponseEncoder: Send + Sync + 'static {
    type Output: Send + 'static;
    const VERSION: StreamVersion;

    async fn encode(&self, response: &StreamResponse) -> Result<Self::Output, Status>;
}

struct V1Encoder {
    finder: CachedMarketFinder,
}

#[async_trait]
impl ResponseEncoder for V1Encoder {
    type Output = v1::StreamResponse;
    const VERSION: StreamVersion = StreamVersion::V1;

    async fn encode(&self, response: &StreamResponse) -> Result<Self::Output, Status> {
        response_to_v1(response, &self.finder)
            .await
            .map_err(|e| Status::internal(e.to_string()))
    }
}

struct V2Encoder;

#[async_trait]
impl ResponseEncoder for V2Encoder {
    type Output = v2::StreamResponse;
    const VERSION: StreamVersion = StreamVersion::V2;

    async fn encode(&self, response: &StreamResponse) -> Result<Self::Output, Status> {
        Ok(v2::StreamResponse::from(response))
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC streaming server for chain events.
#[derive(Clone)]
pub struct ChainStreamServer {
    config: ChainStreamServerConfig,
    bus: Arc<EventBus>,
    markets: Arc<dyn MarketStore>,
    gas_price: Arc<dyn GasPriceSource>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ChainStreamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStreamServer")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl ChainStreamServer {
    /// Create a server. Cancelling `shutdown` ends every stream with
    /// `Canceled`.
    #[must_use]
    pub fn new(
        config: ChainStreamServerConfig,
        bus: Arc<EventBus>,
        markets: Arc<dyn MarketStore>,
        gas_price: Arc<dyn GasPriceSource>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            bus,
            markets,
            gas_price,
            shutdown,
        }
    }

    /// Open a v1 subscription.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when no filter is set and `Internal` when
    /// the bus subscription fails.
    pub fn open_v1(
        &self,
        request: StreamRequest,
    ) -> Result<ResponseReceiver<v1::StreamResponse>, Status> {
        let encoder = V1Encoder {
            finder: CachedMarketFinder::new(Arc::clone(&self.markets)),
        };
        self.open(request, encoder)
    }

    /// Open a v2 subscription.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when no filter is set and `Internal` when
    /// the bus subscription fails.
    pub fn open_v2(
        &self,
        request: StreamRequest,
    ) -> Result<ResponseReceiver<v2::StreamResponse>, Status> {
        self.open(request, V2Encoder)
    }

    fn open<E: ResponseEncoder>(
        &self,
        request: StreamRequest,
        encoder: E,
    ) -> Result<ResponseReceiver<E::Output>, Status> {
        request
            .validate()
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let client_id = Uuid::new_v4().to_string();
        let subscription = self
            .bus
            .subscribe(&client_id)
            .map_err(|e| Status::internal(format!("failed to subscribe to topic: {e}")))?;

        let (tx, rx) = mpsc::channel(self.config.outbound_buffer.max(1));
        let delivery = Delivery {
            subscription,
            request,
            encoder,
            gas_price: Arc::clone(&self.gas_price),
            shutdown: self.shutdown.clone(),
            tx,
        };

        tracing::info!(client_id = %client_id, version = E::VERSION.as_str(), "Stream opened");
        metrics::adjust_active_streams(E::VERSION, 1.0);
        tokio::spawn(delivery.run());

        Ok(rx)
    }
}

#[tonic::async_trait]
impl StreamV1Service for ChainStreamServer {
    type StreamStream = BoxedStream<v1::StreamResponse>;

    async fn stream(
        &self,
        request: Request<v1::StreamRequest>,
    ) -> StreamResult<Self::StreamStream> {
        let request = StreamRequest::from(&request.into_inner());
        let rx = self.open_v1(request)?;
        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamStream
        ))
    }
}

#[tonic::async_trait]
impl StreamV2Service for ChainStreamServer {
    type StreamV2Stream = BoxedStream<v2::StreamResponse>;

    async fn stream_v2(
        &self,
        request: Request<v2::StreamRequest>,
    ) -> StreamResult<Self::StreamV2Stream> {
        let request = StreamRequest::from(&request.into_inner());
        let rx = self.open_v2(request)?;
        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamV2Stream
        ))
    }
}

// =============================================================================
// Delivery Loop
// =============================================================================

struct Delivery<E: ResponseEncoder> {
    subscription: BusSubscription,
    request: StreamRequest,
    encoder: E,
    gas_price: Arc<dyn GasPriceSource>,
    shutdown: CancellationToken,
    tx: mpsc::Sender<Result<E::Output, Status>>,
}

impl<E: ResponseEncoder> Delivery<E> {
    async fn run(mut self) {
        let client_id = self.subscription.client_id().to_string();

        match self.deliver().await {
            Ok(()) => tracing::info!(client_id = %client_id, "Stream closed by client"),
            Err((reason, status)) => {
                tracing::warn!(
                    client_id = %client_id,
                    code = ?status.code(),
                    error = status.message(),
                    "Stream terminated"
                );
                metrics::record_stream_error(E::VERSION, reason);
                // The client may already be gone.
                let _ = self.tx.send(Err(status)).await;
            }
        }

        metrics::adjust_active_streams(E::VERSION, -1.0);
        // Dropping self releases the bus subscription.
    }

    async fn deliver(&mut self) -> Result<(), (&'static str, Status)> {
        let mut expected_height = 0u64;

        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    return Err(("shutdown", Status::cancelled("server is shutting down")));
                }
                () = self.tx.closed() => return Ok(()),
                event = self.subscription.recv() => event,
            };

            let buffer = match event {
                BusEvent::Message(BusMessage::Block(buffer)) => buffer,
                BusEvent::Message(BusMessage::Error(message)) => {
                    return Err(("pipeline", Status::internal(message)));
                }
                BusEvent::Lagged { skipped } => {
                    return Err((
                        "lagged",
                        Status::internal(format!(
                            "stream buffer overflow: subscriber missed {skipped} blocks"
                        )),
                    ));
                }
                BusEvent::Closed => {
                    return Err(("bus_closed", Status::cancelled("event bus stopped")));
                }
            };

            let started = Instant::now();
            let height = buffer.block_height();
            if expected_height == 0 {
                expected_height = height;
            }
            if height != expected_height {
                tracing::error!(height, expected_height, "Block height mismatch");
                return Err(("height_mismatch", Status::internal("block height mismatch")));
            }

            let response = StreamResponse::from_buffer(
                &buffer,
                &self.request,
                self.gas_price.current_gas_price(),
            )
            .map_err(|e| ("filter", Status::internal(e.to_string())))?;
            drop(buffer);
            metrics::record_filter_duration(started.elapsed());

            let wire = self
                .encoder
                .encode(&response)
                .await
                .map_err(|status| ("convert", status))?;

            if self.tx.send(Ok(wire)).await.is_err() {
                return Ok(());
            }
            metrics::record_response_sent(E::VERSION);
            expected_height = height + 1;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use tonic::Code;

    use super::*;
    use crate::application::ports::{MockMarketStore, StaticGasPrice};
    use crate::domain::buffer::ResponseBuffer;
    use crate::domain::records::{DomainRecord, OracleKind, OraclePrice};
    use crate::domain::request::SymbolsFilter;
    use rust_decimal::Decimal;

    struct Fixture {
        bus: Arc<EventBus>,
        server: ChainStreamServer,
        shutdown: CancellationToken,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(EventBus::new(16));
        bus.start().unwrap();
        let shutdown = CancellationToken::new();
        let server = ChainStreamServer::new(
            ChainStreamServerConfig::default(),
            Arc::clone(&bus),
            Arc::new(MockMarketStore::new()),
            Arc::new(StaticGasPrice::new("160000000")),
            shutdown.clone(),
        );
        Fixture {
            bus,
            server,
            shutdown,
        }
    }

    fn prices_request() -> StreamRequest {
        StreamRequest {
            oracle_prices: Some(SymbolsFilter {
                symbol: vec!["*".into()],
            }),
            ..StreamRequest::default()
        }
    }

    fn block(height: u64) -> BusMessage {
        let buffer = ResponseBuffer::new();
        buffer.write(|s| {
            s.block_height = height;
            s.insert(DomainRecord::OraclePrice(OraclePrice {
                symbol: "BTC".into(),
                price: Decimal::ONE_HUNDRED,
                kind: OracleKind::Provider,
            }));
        });
        BusMessage::Block(Arc::new(buffer))
    }

    async fn next<T>(rx: &mut ResponseReceiver<T>) -> Result<T, Status> {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("stream ended")
    }

    async fn wait_for_subscribers(bus: &EventBus, count: usize) {
        timeout(Duration::from_secs(2), async {
            while bus.subscriber_count() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_subscribing() {
        let f = fixture();

        let status = f.server.open_v2(StreamRequest::default()).unwrap_err();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "at least one filter must be set");
        assert_eq!(f.bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn delivers_filtered_v2_responses() {
        let f = fixture();
        let mut rx = f.server.open_v2(prices_request()).unwrap();

        f.bus.publish(block(10)).unwrap();

        let response = next(&mut rx).await.unwrap();
        assert_eq!(response.block_height, 10);
        assert_eq!(response.gas_price, "160000000");
        assert_eq!(response.oracle_prices.len(), 1);
        assert_eq!(response.oracle_prices[0].r#type, "provider");
    }

    #[tokio::test]
    async fn height_gap_terminates_stream() {
        let f = fixture();
        let mut rx = f.server.open_v2(prices_request()).unwrap();

        for height in [100, 101, 103] {
            f.bus.publish(block(height)).unwrap();
        }

        assert_eq!(next(&mut rx).await.unwrap().block_height, 100);
        assert_eq!(next(&mut rx).await.unwrap().block_height, 101);
        let status = next(&mut rx).await.unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "block height mismatch");
        wait_for_subscribers(&f.bus, 0).await;
    }

    #[tokio::test]
    async fn bus_error_is_internal() {
        let f = fixture();
        let mut rx = f.server.open_v2(prices_request()).unwrap();

        f.bus
            .publish(BusMessage::Error("chain stream event buffer overflow".into()))
            .unwrap();

        let status = next(&mut rx).await.unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert!(status.message().contains("buffer overflow"));
    }

    #[tokio::test]
    async fn shutdown_cancels_streams() {
        let f = fixture();
        let mut rx = f.server.open_v2(prices_request()).unwrap();

        f.shutdown.cancel();

        let status = next(&mut rx).await.unwrap_err();
        assert_eq!(status.code(), Code::Cancelled);
        assert_eq!(status.message(), "server is shutting down");
    }

    #[tokio::test]
    async fn client_disconnect_releases_subscription() {
        let f = fixture();
        let rx = f.server.open_v2(prices_request()).unwrap();
        assert_eq!(f.bus.subscriber_count(), 1);

        drop(rx);

        wait_for_subscribers(&f.bus, 0).await;
    }

    #[tokio::test]
    async fn v1_unknown_market_is_internal() {
        let bus = Arc::new(EventBus::new(16));
        bus.start().unwrap();
        let mut store = MockMarketStore::new();
        store.expect_spot_market().returning(|_, _| Ok(None));
        let server = ChainStreamServer::new(
            ChainStreamServerConfig::default(),
            Arc::clone(&bus),
            Arc::new(store),
            Arc::new(StaticGasPrice::new("")),
            CancellationToken::new(),
        );
        let mut rx = server.open_v1(StreamRequest::full()).unwrap();

        let buffer = ResponseBuffer::new();
        buffer.write(|s| {
            s.block_height = 3;
            s.insert(DomainRecord::SpotTrade(crate::domain::records::SpotTrade {
                market_id: "m9".into(),
                is_buy: true,
                execution_type: "Market".into(),
                quantity: Decimal::ONE,
                price: Decimal::ONE,
                subaccount_id: "s1".into(),
                fee: Decimal::ZERO,
                order_hash: String::new(),
                fee_recipient_address: String::new(),
                cid: String::new(),
                trade_id: String::new(),
            }));
        });
        bus.publish(BusMessage::Block(Arc::new(buffer))).unwrap();

        let status = next(&mut rx).await.unwrap_err();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "spot market doesn't exist m9");
    }
}
