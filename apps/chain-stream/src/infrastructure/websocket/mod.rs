//! WebSocket JSON-RPC Bridge
//!
//! Exposes the v1 stream to browser-class clients at `GET /ws`. Each
//! `subscribe` call opens one v1 stream on the [`ChainStreamServer`] and
//! forwards its responses as JSON-RPC results carrying the subscribe
//! request's id.
//!
//! Subscriptions are keyed by the SHA-256 of the request's JSON encoding,
//! scoped to the remote address. Closing the connection cancels every
//! subscription it holds.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::request::StreamRequest;
use crate::infrastructure::grpc::ChainStreamServer;
use crate::infrastructure::grpc::server::ResponseReceiver;
use crate::infrastructure::grpc::proto::chainstream::v1;
use crate::infrastructure::metrics;

/// JSON-RPC parse error.
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC invalid request.
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC internal error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Error code for a stream that terminated.
pub const STREAM_ERROR: i64 = 1;

const OUTBOUND_BUFFER: usize = 256;

/// Bridge server errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Failed to bind the listen address.
    #[error("failed to bind WebSocket server to {addr}: {source}")]
    Bind {
        /// Listen address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("WebSocket server error: {0}")]
    Serve(#[from] std::io::Error),
}

// =============================================================================
// JSON-RPC Envelope
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id, `null` when it could not be read.
    pub id: Value,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(text) => Some(Message::Text(text.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode JSON-RPC response");
                None
            }
        }
    }
}

/// Subscription key for `request`: hex SHA-256 of its JSON encoding.
#[must_use]
pub fn subscription_key(request: &StreamRequest) -> String {
    let encoded = serde_json::to_vec(request).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

fn parse_query(params: &Value) -> Result<StreamRequest, String> {
    let query = match params {
        Value::Object(map) => map.get("q"),
        Value::Array(items) if items.len() == 1 => items.first(),
        _ => None,
    }
    .ok_or_else(|| "invalid params: expected {\"q\": <request>}".to_string())?;

    let wire: v1::StreamRequest =
        serde_json::from_value(query.clone()).map_err(|e| format!("invalid params: {e}"))?;
    Ok(StreamRequest::from(&wire))
}

// =============================================================================
// Bridge
// =============================================================================

#[derive(Debug)]
struct ActiveSubscription {
    request_id: u64,
    cancel: CancellationToken,
}

/// An opened subscription waiting for its acknowledgement to be sent.
#[derive(Debug)]
struct Forwarder {
    subscriber: String,
    key: String,
    id: u64,
    rx: ResponseReceiver<v1::StreamResponse>,
    cancel: CancellationToken,
}

/// Per-connection subscription registry over a [`ChainStreamServer`].
#[derive(Debug)]
pub struct WebSocketBridge {
    server: ChainStreamServer,
    subscriptions: Mutex<HashMap<String, HashMap<String, ActiveSubscription>>>,
}

impl WebSocketBridge {
    /// Create a bridge over `server`.
    #[must_use]
    pub fn new(server: ChainStreamServer) -> Self {
        Self {
            server,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscriptions held by `subscriber`.
    #[must_use]
    pub fn subscription_count(&self, subscriber: &str) -> usize {
        self.subscriptions
            .lock()
            .get(subscriber)
            .map_or(0, HashMap::len)
    }

    /// Router serving `GET /ws`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self)
    }

    /// Serve on `addr` until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if binding or serving fails.
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serve`] if the server fails.
    pub async fn serve_listener(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        tracing::info!(addr = ?listener.local_addr().ok(), "WebSocket bridge listening");
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
        Ok(())
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket, remote: SocketAddr) {
        let subscriber = remote.to_string();
        tracing::info!(subscriber = %subscriber, "WebSocket client connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<RpcResponse>(OUTBOUND_BUFFER);

        let writer = tokio::spawn(async move {
            while let Some(response) = out_rx.recv().await {
                let Some(message) = response.to_message() else {
                    continue;
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(subscriber = %subscriber, error = %e, "WebSocket read failed");
                    break;
                }
            };

            let (response, forwarder) = self.handle_text(&subscriber, text.as_str());
            if out_tx.send(response).await.is_err() {
                break;
            }
            // Stream items follow the subscribe acknowledgement.
            if let Some(forwarder) = forwarder {
                tokio::spawn(Arc::clone(&self).forward(forwarder, out_tx.clone()));
            }
        }

        self.drop_subscriber(&subscriber);
        drop(out_tx);
        writer.abort();
        tracing::info!(subscriber = %subscriber, "WebSocket client disconnected");
    }

    fn handle_text(&self, subscriber: &str, text: &str) -> (RpcResponse, Option<Forwarder>) {
        let request: RpcRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                metrics::record_ws_request("unknown", "parse_error");
                let response =
                    RpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {e}"));
                return (response, None);
            }
        };

        let Some(id) = request.id.as_u64() else {
            metrics::record_ws_request("unknown", "invalid_request");
            let response = RpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "invalid request: expected non-negative int as id",
            );
            return (response, None);
        };

        let result = match request.method.as_str() {
            "subscribe" => self.subscribe(subscriber, id, &request.params).map(Some),
            "unsubscribe" => self.unsubscribe(subscriber, &request.params).map(|()| None),
            _ => {
                metrics::record_ws_request("unknown", "method_not_found");
                let response = RpcResponse::error(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {}", request.method),
                );
                return (response, None);
            }
        };

        match result {
            Ok(forwarder) => {
                metrics::record_ws_request(&request.method, "ok");
                let response =
                    RpcResponse::success(request.id, Value::String("success".to_string()));
                (response, forwarder)
            }
            Err(message) => {
                metrics::record_ws_request(&request.method, "error");
                (RpcResponse::error(request.id, INTERNAL_ERROR, message), None)
            }
        }
    }

    fn subscribe(&self, subscriber: &str, id: u64, params: &Value) -> Result<Forwarder, String> {
        let request = parse_query(params)?;
        let key = subscription_key(&request);
        let cancel = CancellationToken::new();

        let rx = {
            let mut subscriptions = self.subscriptions.lock();
            let entries = subscriptions.entry(subscriber.to_string()).or_default();
            if let Some(existing) = entries.get(&key) {
                return Err(format!("request exists, id: {}", existing.request_id));
            }

            let rx = self
                .server
                .open_v1(request)
                .map_err(|status| status.message().to_string())?;

            entries.insert(
                key.clone(),
                ActiveSubscription {
                    request_id: id,
                    cancel: cancel.clone(),
                },
            );
            rx
        };

        tracing::debug!(subscriber, id, "WebSocket subscription opened");
        Ok(Forwarder {
            subscriber: subscriber.to_string(),
            key,
            id,
            rx,
            cancel,
        })
    }

    fn unsubscribe(&self, subscriber: &str, params: &Value) -> Result<(), String> {
        let request = parse_query(params)?;
        let key = subscription_key(&request);

        let removed = self
            .subscriptions
            .lock()
            .get_mut(subscriber)
            .and_then(|entries| entries.remove(&key));

        match removed {
            Some(subscription) => {
                subscription.cancel.cancel();
                tracing::debug!(subscriber, id = subscription.request_id, "WebSocket subscription closed");
                Ok(())
            }
            None => Err("subscription does not exist".to_string()),
        }
    }

    async fn forward(self: Arc<Self>, forwarder: Forwarder, out: mpsc::Sender<RpcResponse>) {
        let Forwarder {
            subscriber,
            key,
            id,
            mut rx,
            cancel,
        } = forwarder;

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                item = rx.recv() => item,
            };

            let response = match item {
                Some(Ok(response)) => match serde_json::to_value(&response) {
                    Ok(result) => RpcResponse::success(Value::from(id), result),
                    Err(e) => RpcResponse::error(
                        Value::from(id),
                        STREAM_ERROR,
                        format!("stream error: {e}"),
                    ),
                },
                Some(Err(status)) => RpcResponse::error(
                    Value::from(id),
                    STREAM_ERROR,
                    format!("stream error: {}", status.message()),
                ),
                None => break,
            };

            let terminal = response.error.is_some();
            if out.send(response).await.is_err() || terminal {
                break;
            }
        }

        self.remove_if_current(&subscriber, &key, id);
    }

    fn remove_if_current(&self, subscriber: &str, key: &str, id: u64) {
        let mut subscriptions = self.subscriptions.lock();
        if let Some(entries) = subscriptions.get_mut(subscriber) {
            if entries.get(key).is_some_and(|s| s.request_id == id) {
                entries.remove(key);
            }
        }
    }

    fn drop_subscriber(&self, subscriber: &str) {
        let removed = self.subscriptions.lock().remove(subscriber);
        for subscription in removed.into_iter().flat_map(HashMap::into_values) {
            subscription.cancel.cancel();
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(bridge): State<Arc<WebSocketBridge>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bridge.handle_socket(socket, remote))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::SymbolsFilter;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn key_is_stable_and_request_sensitive() {
        let a = StreamRequest {
            oracle_prices: Some(SymbolsFilter {
                symbol: vec!["BTC".into()],
            }),
            ..StreamRequest::default()
        };
        let mut b = a.clone();

        assert_eq!(subscription_key(&a), subscription_key(&b));
        assert_eq!(subscription_key(&a).len(), 64);

        b.oracle_prices = Some(SymbolsFilter {
            symbol: vec!["ETH".into()],
        });
        assert_ne!(subscription_key(&a), subscription_key(&b));
    }

    #[test_case(json!({"q": {"oracle_price_filter": {"symbol": ["*"]}}}); "object params")]
    #[test_case(json!([{"oracle_price_filter": {"symbol": ["*"]}}]); "array params")]
    fn query_is_read_from_params(params: Value) {
        let request = parse_query(&params).unwrap();
        assert_eq!(
            request.oracle_prices.map(|f| f.symbol),
            Some(vec!["*".to_string()])
        );
    }

    #[test]
    fn missing_query_is_rejected() {
        assert!(parse_query(&json!({})).is_err());
        assert!(parse_query(&json!([1, 2])).is_err());
    }

    #[test]
    fn error_response_omits_result() {
        let response = RpcResponse::error(Value::from(3), METHOD_NOT_FOUND, "nope");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], json!(-32601));
        assert!(encoded.get("result").is_none());
    }
}
