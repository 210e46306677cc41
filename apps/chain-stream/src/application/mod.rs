//! Application Layer - Use cases and port definitions.
//!
//! Services that drive the streaming pipeline, and the port interfaces
//! through which they reach ledger state and the fee module.

/// Port interfaces for external collaborators (ledger, gas price).
pub mod ports;

/// Block publisher and market resolver.
pub mod services;
