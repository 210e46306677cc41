//! WebSocket Bridge Integration Tests
//!
//! Drives the JSON-RPC bridge with a real WebSocket client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chain_stream::WebSocketBridge;
use common::{Harness, coinbase_price};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

async fn start_bridge(harness: &Harness) -> Client {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bridge = Arc::new(WebSocketBridge::new(harness.server.clone()));
    let shutdown = harness.shutdown.clone();
    tokio::spawn(async move {
        bridge.serve_listener(listener, shutdown).await.unwrap();
    });

    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn call(client: &mut Client, request: Value) -> Value {
    client
        .send(Message::text(request.to_string()))
        .await
        .unwrap();
    recv(client).await
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn oracle_query(symbol: &str) -> Value {
    json!({"q": {"oracle_price_filter": {"symbol": [symbol]}}})
}

fn request(id: Value, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

#[tokio::test]
async fn subscription_delivers_blocks_under_request_id() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    let ack = call(&mut client, request(json!(1), "subscribe", oracle_query("BTC"))).await;
    assert_eq!(ack["id"], 1);
    assert_eq!(ack["result"], "success");
    harness.wait_for_subscribers(1).await;

    harness
        .publish_block(5, vec![coinbase_price("BTC", "42000.000000")])
        .await;

    let item = recv(&mut client).await;
    assert_eq!(item["id"], 1);
    assert_eq!(item["result"]["block_height"], 5);
    assert_eq!(item["result"]["oracle_prices"][0]["symbol"], "BTC");
}

#[tokio::test]
async fn duplicate_subscription_is_rejected() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    let first = call(&mut client, request(json!(1), "subscribe", oracle_query("BTC"))).await;
    assert_eq!(first["result"], "success");

    let second = call(&mut client, request(json!(2), "subscribe", oracle_query("BTC"))).await;
    assert_eq!(second["id"], 2);
    assert_eq!(second["error"]["code"], -32603);
    assert_eq!(second["error"]["message"], "request exists, id: 1");
    assert_eq!(harness.bus.subscriber_count(), 1);
}

#[tokio::test]
async fn unsubscribe_releases_the_stream() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    call(&mut client, request(json!(1), "subscribe", oracle_query("ETH"))).await;
    harness.wait_for_subscribers(1).await;

    let done = call(&mut client, request(json!(2), "unsubscribe", oracle_query("ETH"))).await;
    assert_eq!(done["result"], "success");

    let again = call(&mut client, request(json!(3), "unsubscribe", oracle_query("ETH"))).await;
    assert_eq!(again["error"]["message"], "subscription does not exist");

    timeout(RECV_TIMEOUT, async {
        while harness.bus.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stream was not released");
}

#[tokio::test]
async fn malformed_requests_get_json_rpc_errors() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    let unknown = call(&mut client, request(json!(1), "publish", json!({}))).await;
    assert_eq!(unknown["error"]["code"], -32601);

    let bad_id = call(&mut client, request(json!(-4), "subscribe", oracle_query("BTC"))).await;
    assert_eq!(
        bad_id["error"]["message"],
        "invalid request: expected non-negative int as id"
    );

    client.send(Message::text("{nope")).await.unwrap();
    let garbage = recv(&mut client).await;
    assert_eq!(garbage["error"]["code"], -32700);

    let empty = call(&mut client, request(json!(5), "subscribe", json!({"q": {}}))).await;
    assert_eq!(empty["error"]["code"], -32603);
    assert_eq!(harness.bus.subscriber_count(), 0);
}

#[tokio::test]
async fn stream_errors_are_forwarded_with_code_one() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    call(&mut client, request(json!(9), "subscribe", oracle_query("*"))).await;
    harness.wait_for_subscribers(1).await;

    harness.publisher.stop().await;

    let error = recv(&mut client).await;
    assert_eq!(error["id"], 9);
    assert_eq!(error["error"]["code"], 1);
    assert_eq!(error["error"]["message"], "stream error: event bus stopped");
}

#[tokio::test]
async fn disconnect_cancels_all_subscriptions() {
    let harness = Harness::running(vec![]).await;
    let mut client = start_bridge(&harness).await;

    call(&mut client, request(json!(1), "subscribe", oracle_query("BTC"))).await;
    call(&mut client, request(json!(2), "subscribe", oracle_query("ETH"))).await;
    harness.wait_for_subscribers(2).await;

    client.close(None).await.unwrap();
    drop(client);

    timeout(RECV_TIMEOUT, async {
        while harness.bus.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriptions were not cancelled");
}
