//! Chain Stream Binary
//!
//! Starts the block event streaming service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chain-stream
//! ```
//!
//! # Environment Variables
//!
//! - `CHAINSTREAM_SERVER`: gRPC listen address, empty disables (default: 0.0.0.0:9999)
//! - `CHAINSTREAM_BUFFER_CAP`: Per-subscriber buffer depth (default: 100)
//! - `CHAINSTREAM_PUBLISHER_BUFFER_CAP`: Publisher channel depth (default: 100)
//! - `CHAINSTREAM_ENFORCE_KEEPALIVE`: Apply the keepalive settings below (default: false)
//! - `CHAINSTREAM_MIN_CLIENT_PING_INTERVAL`, `CHAINSTREAM_MAX_CONNECTION_IDLE`,
//!   `CHAINSTREAM_SERVER_PING_INTERVAL`, `CHAINSTREAM_SERVER_PING_RESPONSE_TIMEOUT`: seconds
//! - `WEBSOCKET_SERVER`: WebSocket bridge listen address (default: disabled)
//! - `CHAINSTREAM_INGEST_ADDR`: Engine ingest address (default: 127.0.0.1:9998)
//! - `CHAINSTREAM_MARKETS_FILE`: Market registry JSON (default: none)
//! - `CHAINSTREAM_GAS_PRICE`: Gas price reported in v2 responses
//! - `CHAINSTREAM_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint
//! - `OTEL_SERVICE_NAME`: Service name (default: chain-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chain_stream::infrastructure::grpc::proto::chainstream::{v1, v2};
use chain_stream::infrastructure::telemetry;
use chain_stream::{
    ChainStreamConfig, ChainStreamServer, ChainStreamServerConfig, Decoder, EventBus,
    FileMarketStore, GasPriceSource, HealthServer, HealthServerState, IngestListener, MarketStore,
    Publisher, StaticGasPrice, WebSocketBridge, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Chain Stream");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ChainStreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Pipeline: engine -> publisher -> bus
    let bus = Arc::new(EventBus::new(config.bus_capacity));
    let publisher = Arc::new(Publisher::new(
        Decoder::default(),
        Arc::clone(&bus),
        config.publisher_capacity,
    ));

    let markets: Arc<dyn MarketStore> = match &config.markets_file {
        Some(path) => Arc::new(
            FileMarketStore::open(path)
                .with_context(|| format!("loading market registry {}", path.display()))?,
        ),
        None => {
            tracing::warn!("No market registry configured; v1 streams cannot rescale market records");
            Arc::new(FileMarketStore::empty())
        }
    };
    let gas_price: Arc<dyn GasPriceSource> = Arc::new(StaticGasPrice::new(config.gas_price.clone()));

    let (events_tx, events_rx) = mpsc::channel(config.publisher_capacity);
    publisher.run(events_rx)?;

    let ingest = IngestListener::bind(config.ingest_addr, events_tx).await?;
    tasks.push(tokio::spawn(ingest.run(shutdown_token.clone())));

    let grpc_server = ChainStreamServer::new(
        ChainStreamServerConfig::default(),
        Arc::clone(&bus),
        markets,
        gas_price,
        shutdown_token.clone(),
    );

    if let Some(addr) = config.grpc_addr {
        tasks.push(spawn_grpc(addr, grpc_server.clone(), &config, shutdown_token.clone()));
    } else {
        tracing::info!("gRPC server disabled");
    }

    if let Some(addr) = config.websocket_addr {
        let bridge = Arc::new(WebSocketBridge::new(grpc_server.clone()));
        let ws_shutdown = shutdown_token.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = bridge.serve(addr, ws_shutdown).await {
                tracing::error!(error = %e, "WebSocket bridge error");
            }
        }));
    }

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&publisher),
    ));
    let health_server = HealthServer::new(config.health_port, health_state, shutdown_token.clone());
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    tracing::info!("Chain stream ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        publisher.stop().await;
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally");
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "Shutdown timed out");
    }

    tracing::info!("Chain stream stopped");
    Ok(())
}

/// Serve both stream versions on `addr`, applying keepalive settings.
fn spawn_grpc(
    addr: SocketAddr,
    server: ChainStreamServer,
    config: &ChainStreamConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let keepalive = &config.keepalive;
    if keepalive.enforce && !keepalive.min_client_ping_interval.is_zero() {
        tracing::warn!(
            interval_secs = keepalive.min_client_ping_interval.as_secs(),
            "Minimum client ping interval is not supported by the transport; ignoring"
        );
    }

    let mut builder = Server::builder()
        .http2_keepalive_interval(keepalive.http2_keepalive_interval())
        .http2_keepalive_timeout(keepalive.http2_keepalive_timeout());
    if let Some(age) = keepalive.max_connection_age() {
        builder = builder.max_connection_age(age);
    }

    let router = builder
        .add_service(v1::stream_server::StreamServer::new(server.clone()))
        .add_service(v2::stream_server::StreamServer::new(server));

    tokio::spawn(async move {
        tracing::info!(addr = %addr, "gRPC server listening");
        if let Err(e) = router.serve_with_shutdown(addr, shutdown.cancelled()).await {
            tracing::error!(error = %e, "gRPC server error");
        }
        tracing::info!("gRPC server stopped");
    })
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ChainStreamConfig) {
    tracing::info!(
        grpc_addr = ?config.grpc_addr,
        websocket_addr = ?config.websocket_addr,
        ingest_addr = %config.ingest_addr,
        health_port = config.health_port,
        bus_capacity = config.bus_capacity,
        publisher_capacity = config.publisher_capacity,
        "Configuration loaded"
    );
    tracing::debug!(keepalive = ?config.keepalive, markets_file = ?config.markets_file, "Stream settings");
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
