//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Pipeline**: blocks published, events decoded, decode errors, overflows
//! - **Streams**: responses sent and stream errors per protocol version
//! - **Bus**: active subscribers and the last published height
//! - **Latency**: time spent filtering a block for one subscriber
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns [`BuildError`] if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "chain_stream_blocks_published_total",
        "Blocks published on the event bus"
    );
    describe_counter!(
        "chain_stream_events_decoded_total",
        "Engine events decoded by topic"
    );
    describe_counter!(
        "chain_stream_decode_errors_total",
        "Engine events that failed to decode by topic"
    );
    describe_counter!(
        "chain_stream_buffer_overflows_total",
        "Publisher ingestion buffer overflows"
    );

    describe_counter!(
        "chain_stream_responses_sent_total",
        "Stream responses sent to clients"
    );
    describe_counter!(
        "chain_stream_stream_errors_total",
        "Streams terminated with an error"
    );
    describe_counter!(
        "chain_stream_ws_requests_total",
        "WebSocket JSON-RPC requests by method and outcome"
    );

    describe_gauge!(
        "chain_stream_active_streams",
        "Number of active gRPC streams"
    );
    describe_gauge!(
        "chain_stream_bus_subscribers",
        "Number of event bus subscribers"
    );
    describe_gauge!(
        "chain_stream_last_block_height",
        "Height of the last published block"
    );

    describe_histogram!(
        "chain_stream_filter_duration_seconds",
        "Time to filter one block for one subscriber"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Wire protocol version label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVersion {
    /// Chain-format fixed-point responses.
    V1,
    /// Human-readable responses.
    V2,
}

impl StreamVersion {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// Record a published block.
pub fn record_block_published(height: u64) {
    counter!("chain_stream_blocks_published_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    gauge!("chain_stream_last_block_height").set(height as f64);
}

/// Record a decoded event.
pub fn record_event_decoded(topic: &str) {
    counter!("chain_stream_events_decoded_total", "topic" => topic.to_string()).increment(1);
}

/// Record a decode failure.
pub fn record_decode_error(topic: &str) {
    counter!("chain_stream_decode_errors_total", "topic" => topic.to_string()).increment(1);
}

/// Record an ingestion buffer overflow.
pub fn record_buffer_overflow() {
    counter!("chain_stream_buffer_overflows_total").increment(1);
}

/// Record a response sent on a stream.
pub fn record_response_sent(version: StreamVersion) {
    counter!("chain_stream_responses_sent_total", "version" => version.as_str()).increment(1);
}

/// Record a stream terminated with an error.
pub fn record_stream_error(version: StreamVersion, reason: &'static str) {
    counter!(
        "chain_stream_stream_errors_total",
        "version" => version.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a WebSocket JSON-RPC request.
pub fn record_ws_request(method: &str, outcome: &'static str) {
    counter!(
        "chain_stream_ws_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Adjust the active stream gauge.
pub fn adjust_active_streams(version: StreamVersion, delta: f64) {
    gauge!("chain_stream_active_streams", "version" => version.as_str()).increment(delta);
}

/// Update the bus subscriber count.
pub fn set_bus_subscribers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("chain_stream_bus_subscribers").set(count as f64);
}

/// Record the time spent filtering a block.
pub fn record_filter_duration(duration: Duration) {
    histogram!("chain_stream_filter_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_version_as_str() {
        assert_eq!(StreamVersion::V1.as_str(), "v1");
        assert_eq!(StreamVersion::V2.as_str(), "v2");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_block_published(7);
        record_event_decoded("topic");
        record_stream_error(StreamVersion::V2, "height_mismatch");
        set_bus_subscribers(3);
        record_filter_duration(Duration::from_millis(1));
    }
}
