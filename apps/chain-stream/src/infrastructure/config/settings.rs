//! Chain Stream Configuration Settings
//!
//! Configuration types for the stream service, loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::DEFAULT_PUBLISHER_CAPACITY;
use crate::infrastructure::bus::DEFAULT_BUS_CAPACITY;

const DEFAULT_GRPC_ADDR: &str = "0.0.0.0:9999";
const DEFAULT_INGEST_ADDR: &str = "127.0.0.1:9998";
const DEFAULT_HEALTH_PORT: u16 = 8083;

/// HTTP/2 keepalive enforcement for the gRPC server.
///
/// A zero duration leaves the corresponding transport default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepaliveSettings {
    /// Apply the parameters below.
    pub enforce: bool,
    /// Minimum interval between client pings.
    pub min_client_ping_interval: Duration,
    /// Maximum connection idle time before the server closes it.
    pub max_connection_idle: Duration,
    /// Server ping interval.
    pub server_ping_interval: Duration,
    /// Time to wait for a ping acknowledgement.
    pub server_ping_response_timeout: Duration,
}

impl KeepaliveSettings {
    /// HTTP/2 keepalive interval, if enforced.
    #[must_use]
    pub fn http2_keepalive_interval(&self) -> Option<Duration> {
        self.enforced(self.server_ping_interval)
    }

    /// HTTP/2 keepalive timeout, if enforced.
    #[must_use]
    pub fn http2_keepalive_timeout(&self) -> Option<Duration> {
        self.enforced(self.server_ping_response_timeout)
    }

    /// Maximum connection age, if enforced.
    #[must_use]
    pub fn max_connection_age(&self) -> Option<Duration> {
        self.enforced(self.max_connection_idle)
    }

    fn enforced(&self, value: Duration) -> Option<Duration> {
        (self.enforce && !value.is_zero()).then_some(value)
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ChainStreamConfig {
    /// gRPC listen address. `None` disables the gRPC server.
    pub grpc_addr: Option<SocketAddr>,
    /// Per-subscriber event bus buffer depth.
    pub bus_capacity: usize,
    /// Publisher internal channel depth.
    pub publisher_capacity: usize,
    /// gRPC keepalive parameters.
    pub keepalive: KeepaliveSettings,
    /// WebSocket bridge listen address. `None` disables the bridge.
    pub websocket_addr: Option<SocketAddr>,
    /// Engine ingest listen address.
    pub ingest_addr: SocketAddr,
    /// Market metadata registry file.
    pub markets_file: Option<PathBuf>,
    /// Gas price reported in v2 responses.
    pub gas_price: String,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ChainStreamConfig {
    fn default() -> Self {
        Self {
            grpc_addr: DEFAULT_GRPC_ADDR.parse().ok(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            publisher_capacity: DEFAULT_PUBLISHER_CAPACITY,
            keepalive: KeepaliveSettings::default(),
            websocket_addr: None,
            ingest_addr: SocketAddr::from(([127, 0, 0, 1], 9998)),
            markets_file: None,
            gas_price: String::new(),
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl ChainStreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a listen address cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a listen address cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let grpc_addr = match lookup("CHAINSTREAM_SERVER") {
            None => defaults.grpc_addr,
            Some(v) => parse_optional_addr("CHAINSTREAM_SERVER", &v)?,
        };

        let websocket_addr = match lookup("WEBSOCKET_SERVER") {
            None => None,
            Some(v) => parse_optional_addr("WEBSOCKET_SERVER", &v)?,
        };

        let ingest_addr = match lookup("CHAINSTREAM_INGEST_ADDR").filter(|v| !v.trim().is_empty()) {
            None => parse_addr("CHAINSTREAM_INGEST_ADDR", DEFAULT_INGEST_ADDR)?,
            Some(v) => parse_addr("CHAINSTREAM_INGEST_ADDR", &v)?,
        };

        let keepalive = KeepaliveSettings {
            enforce: parse_bool(lookup("CHAINSTREAM_ENFORCE_KEEPALIVE")),
            min_client_ping_interval: parse_secs(lookup("CHAINSTREAM_MIN_CLIENT_PING_INTERVAL")),
            max_connection_idle: parse_secs(lookup("CHAINSTREAM_MAX_CONNECTION_IDLE")),
            server_ping_interval: parse_secs(lookup("CHAINSTREAM_SERVER_PING_INTERVAL")),
            server_ping_response_timeout: parse_secs(lookup(
                "CHAINSTREAM_SERVER_PING_RESPONSE_TIMEOUT",
            )),
        };

        Ok(Self {
            grpc_addr,
            bus_capacity: parse_capacity(lookup("CHAINSTREAM_BUFFER_CAP"), defaults.bus_capacity),
            publisher_capacity: parse_capacity(
                lookup("CHAINSTREAM_PUBLISHER_BUFFER_CAP"),
                defaults.publisher_capacity,
            ),
            keepalive,
            websocket_addr,
            ingest_addr,
            markets_file: lookup("CHAINSTREAM_MARKETS_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            gas_price: lookup("CHAINSTREAM_GAS_PRICE").unwrap_or_default(),
            health_port: lookup("CHAINSTREAM_HEALTH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.health_port),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_optional_addr(key: &str, value: &str) -> Result<Option<SocketAddr>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_addr(key, value).map(Some)
}

fn parse_capacity(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(default)
}

fn parse_secs(value: Option<String>) -> Duration {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(Duration::ZERO, Duration::from_secs)
}

fn parse_bool(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}
