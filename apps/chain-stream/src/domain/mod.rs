//! Domain Layer - Core chain streaming types and logic.
//!
//! Pure types and functions: raw engine events, canonical records, the
//! event decoder, the per-block response buffer and subscriber filtering.
//! Nothing here performs I/O.

/// Raw events and per-block batches from the execution engine.
pub mod events;

/// Canonical domain records.
pub mod records;

/// Event type dispatch and attribute decoding.
pub mod decoder;

/// Per-block record buffer.
pub mod buffer;

/// Single- and dual-dimension record filtering.
pub mod filter;

/// Subscription filters.
pub mod request;

/// Filtered per-block responses.
pub mod response;

/// Market precision metadata and fixed-point scaling.
pub mod market;
