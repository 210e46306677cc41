//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, and the network surfaces.

/// Block fan-out to stream subscribers.
pub mod bus;

/// gRPC streaming server (v1 and v2).
pub mod grpc;

/// JSON-RPC bridge over WebSocket.
pub mod websocket;

/// TCP listener for engine event batches.
pub mod ingest;

/// File-backed market registry.
pub mod ledger;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
