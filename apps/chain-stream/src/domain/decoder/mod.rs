//! Event Decoder
//!
//! Turns one [`RawEvent`] into zero or more [`DomainRecord`]s. Dispatch is a
//! plain lookup of the event type in a [`DecoderRegistry`] built once and
//! handed to the [`Decoder`]; several decoders with different registries
//! can coexist.
//!
//! Decoding is pure: the same event always yields the same records. Unknown
//! event types yield nothing. A malformed payload fails that one event only.

mod attributes;
mod bank;
mod exchange;
mod oracle;
pub mod topics;

use std::collections::HashMap;

use thiserror::Error;

use crate::domain::events::RawEvent;
use crate::domain::records::DomainRecord;

pub use attributes::hash_hex;

/// Handler for one event type.
pub type Handler = fn(&RawEvent) -> Result<Vec<DomainRecord>, DecodeError>;

/// Errors raised while decoding a single event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A required attribute is absent.
    #[error("{topic}: missing attribute {key}")]
    MissingAttribute {
        /// Event type.
        topic: String,
        /// Attribute key.
        key: &'static str,
    },

    /// A structured attribute is not valid JSON for its expected shape.
    #[error("{topic}: malformed JSON in attribute {key}: {source}")]
    MalformedJson {
        /// Event type.
        topic: String,
        /// Attribute key.
        key: &'static str,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// An attribute is well-formed but carries an unusable value.
    #[error("{topic}: invalid attribute {key}: {reason}")]
    InvalidAttribute {
        /// Event type.
        topic: String,
        /// Attribute key.
        key: &'static str,
        /// What was wrong.
        reason: String,
    },
}

impl DecodeError {
    /// Event type the error was raised for.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::MissingAttribute { topic, .. }
            | Self::MalformedJson { topic, .. }
            | Self::InvalidAttribute { topic, .. } => topic,
        }
    }
}

/// Mapping from event type to handler.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl DecoderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every bank, exchange and oracle topic.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        bank::register(&mut registry);
        exchange::register(&mut registry);
        oracle::register(&mut registry);
        registry
    }

    /// Register (or replace) the handler for `topic`.
    pub fn register(&mut self, topic: &'static str, handler: Handler) -> &mut Self {
        self.handlers.insert(topic, handler);
        self
    }

    /// Handler for `topic`, if registered.
    #[must_use]
    pub fn handler(&self, topic: &str) -> Option<Handler> {
        self.handlers.get(topic).copied()
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<_> = self.handlers.keys().copied().collect();
        topics.sort_unstable();
        topics
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no topic is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Stateless event decoder.
#[derive(Debug, Clone)]
pub struct Decoder {
    registry: DecoderRegistry,
}

impl Decoder {
    /// Create a decoder over `registry`.
    #[must_use]
    pub const fn new(registry: DecoderRegistry) -> Self {
        Self { registry }
    }

    /// Whether `topic` has a handler.
    #[must_use]
    pub fn handles(&self, topic: &str) -> bool {
        self.registry.handler(topic).is_some()
    }

    /// Decode one event.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when a known event is missing attributes or
    /// carries malformed values.
    pub fn decode(&self, event: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
        match self.registry.handler(&event.kind) {
            Some(handler) => handler(&event.without_block_mode()),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderRegistry::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_registry_covers_every_topic() {
        let registry = DecoderRegistry::standard();
        assert_eq!(registry.len(), 20);
        assert!(registry.topics().contains(&topics::ORDER_FAIL));
        assert!(registry.handler(topics::STORK_PRICES).is_some());
    }

    #[test]
    fn unknown_topic_yields_nothing() {
        let decoder = Decoder::default();
        let event = RawEvent::new("cosmos.staking.v1beta1.EventDelegate").with_attribute("x", "{");

        assert!(decoder.decode(&event).unwrap().is_empty());
    }

    #[test]
    fn custom_registry_is_independent() {
        fn always_empty(_: &RawEvent) -> Result<Vec<DomainRecord>, DecodeError> {
            Ok(Vec::new())
        }

        let mut registry = DecoderRegistry::new();
        registry.register("custom.Event", always_empty);
        let decoder = Decoder::new(registry);

        assert!(decoder.handles("custom.Event"));
        assert!(!decoder.handles(topics::BANK_BALANCES));
    }

    #[test]
    fn block_mode_markers_are_ignored() {
        let decoder = Decoder::default();
        let event = RawEvent::new(topics::PROVIDER_PRICE)
            .with_attribute("mode", "EndBlock")
            .with_attribute("symbol", "\"FOO\"")
            .with_attribute("price", "\"1\"");

        let records = decoder.decode(&event).unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_attribute_reports_topic_and_key() {
        let decoder = Decoder::default();
        let event = RawEvent::new(topics::PROVIDER_PRICE).with_attribute("symbol", "\"FOO\"");

        let err = decoder.decode(&event).unwrap_err();

        assert_eq!(err.topic(), topics::PROVIDER_PRICE);
        assert!(err.to_string().contains("missing attribute price"));
    }

    proptest! {
        #[test]
        fn decoding_is_deterministic(
            symbols in proptest::collection::vec("[A-Z]{3,5}", 0..6),
            prices in proptest::collection::vec(0u32..1_000_000, 0..6),
        ) {
            let decoder = Decoder::default();
            let prices: Vec<String> = prices.iter().map(ToString::to_string).collect();
            let event = RawEvent::new(topics::BAND_IBC_PRICES)
                .with_attribute("symbols", serde_json::to_string(&symbols).unwrap())
                .with_attribute("prices", serde_json::to_string(&prices).unwrap());

            let first = decoder.decode(&event).unwrap();
            let second = decoder.decode(&event).unwrap();

            prop_assert_eq!(first.len(), symbols.len().min(prices.len()));
            prop_assert_eq!(first, second);
        }
    }
}
