#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Chain Stream - Block Event Streaming Service
//!
//! Turns the execution engine's per-block event batches into typed,
//! filterable record streams. One publisher decodes events into a per-block
//! buffer and publishes the buffer on an event bus once the block is
//! flushed; every subscriber filters the buffer through its own request.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Events, records and the filtering core
//!   - `decoder`: Topic registry and attribute decoding
//!   - `buffer`: Per-block indexed record store
//!   - `filter` / `request` / `response`: Subscriber filtering
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market store and gas price interfaces
//!   - `services`: Publisher, market resolver
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bus`: Block fan-out with per-subscriber buffers
//!   - `grpc`: v1 and v2 streaming services
//!   - `websocket`: JSON-RPC bridge onto the v1 stream
//!   - `ingest`: Engine batch listener
//!   - `ledger`: File-backed market registry
//!   - `config` / `health` / `metrics` / `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                ┌───────────┐   ┌─────────┐   ┌──────────────┐
//! Engine ──TCP──►│ Publisher │──►│   Bus   │──►│ gRPC v1 / v2 │──► Client 1..N
//!                └───────────┘   └─────────┘   └──────┬───────┘
//!                                                     └──► WebSocket bridge
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::buffer::ResponseBuffer;
pub use domain::decoder::{DecodeError, Decoder};
pub use domain::events::{EventAttribute, RawEvent, StreamEvents};
pub use domain::market::{MarketKind, MarketMetadata};
pub use domain::request::StreamRequest;
pub use domain::response::StreamResponse;

// Application services and ports
pub use application::ports::{GasPriceSource, LedgerError, MarketStore, StaticGasPrice};
pub use application::services::{CachedMarketFinder, Publisher, PublisherError, PublisherState};

// Infrastructure config
pub use infrastructure::config::{ChainStreamConfig, ConfigError, KeepaliveSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Event bus
pub use infrastructure::bus::{BusError, BusMessage, EventBus, SharedEventBus};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    proto::chainstream::{v1 as proto_v1, v2 as proto_v2},
    server::{ChainStreamServer, ChainStreamServerConfig},
};

// Edge adapters
pub use infrastructure::ingest::{IngestError, IngestListener};
pub use infrastructure::ledger::FileMarketStore;
pub use infrastructure::websocket::WebSocketBridge;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
