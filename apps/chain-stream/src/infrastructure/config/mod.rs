//! Configuration Module
//!
//! Configuration loading for the stream service.

mod settings;

pub use settings::{ChainStreamConfig, ConfigError, KeepaliveSettings};
