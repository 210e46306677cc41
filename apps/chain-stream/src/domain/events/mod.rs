//! Raw Consensus Events
//!
//! Types for the events the execution engine emits while executing a block.
//! An event is an opaque type string plus an ordered list of string
//! attributes; values are either JSON documents or quoted JSON scalars.
//!
//! The engine hands events over in [`StreamEvents`] batches. Several batches
//! may belong to one block; the last one carries `flush = true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute key the engine adds to events emitted outside transactions.
const MODE_KEY: &str = "mode";

/// A single key/value attribute of a [`RawEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value (JSON or quoted scalar).
    pub value: String,
}

impl EventAttribute {
    /// Create a new attribute.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether this is a block-phase marker (`mode=BeginBlock|EndBlock`).
    #[must_use]
    pub fn is_block_mode_marker(&self) -> bool {
        self.key == MODE_KEY && matches!(self.value.as_str(), "BeginBlock" | "EndBlock")
    }
}

/// An event emitted by the consensus engine during block execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event type (fully qualified message name for typed events).
    #[serde(rename = "type")]
    pub kind: String,
    /// Ordered attributes.
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl RawEvent {
    /// Create an event with no attributes.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute append.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute::new(key, value));
        self
    }

    /// First attribute value for `key`, if any.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Copy of the event without `mode=BeginBlock` / `mode=EndBlock` markers.
    #[must_use]
    pub fn without_block_mode(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|attr| !attr.is_block_mode_marker())
                .cloned()
                .collect(),
        }
    }
}

/// A batch of events for one block, as delivered by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvents {
    /// Height of the block the events belong to.
    pub height: u64,
    /// Block time.
    pub block_time: DateTime<Utc>,
    /// Events in emission order.
    #[serde(default)]
    pub events: Vec<RawEvent>,
    /// Whether this is the final batch for the block.
    #[serde(default)]
    pub flush: bool,
}

impl StreamEvents {
    /// Create a batch.
    #[must_use]
    pub const fn new(
        height: u64,
        block_time: DateTime<Utc>,
        events: Vec<RawEvent>,
        flush: bool,
    ) -> Self {
        Self {
            height,
            block_time,
            events,
            flush,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_block_mode_markers_only() {
        let event = RawEvent::new("t")
            .with_attribute("mode", "BeginBlock")
            .with_attribute("mode", "EndBlock")
            .with_attribute("mode", "DeliverTx")
            .with_attribute("market_id", "\"m1\"");

        let filtered = event.without_block_mode();

        assert_eq!(filtered.attributes.len(), 2);
        assert_eq!(filtered.attribute("mode"), Some("DeliverTx"));
        assert_eq!(filtered.attribute("market_id"), Some("\"m1\""));
    }

    #[test]
    fn batch_parses_from_json_line() {
        let line = r#"{"height":7,"block_time":"2024-01-01T00:00:00Z","events":[{"type":"x","attributes":[{"key":"k","value":"v"}]}],"flush":true}"#;

        let batch: StreamEvents = serde_json::from_str(line).unwrap();

        assert_eq!(batch.height, 7);
        assert!(batch.flush);
        assert_eq!(batch.events[0].kind, "x");
        assert_eq!(batch.events[0].attribute("k"), Some("v"));
    }
}
