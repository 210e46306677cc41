//! Attribute access and scalar decoding shared by the topic handlers.

use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bech32::{Bech32, Hrp};
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;

use super::DecodeError;
use crate::domain::events::RawEvent;

/// Width of rendered hashes and byte identifiers.
const HASH_LEN: usize = 32;

/// Human-readable part of chain account addresses.
const ACCOUNT_PREFIX: &str = "inj";

/// Render bytes as a `0x`-prefixed 32-byte hex hash.
///
/// Shorter input is left-padded with zeros; longer input keeps its last
/// 32 bytes.
#[must_use]
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut padded = [0_u8; HASH_LEN];
    let tail = &bytes[bytes.len().saturating_sub(HASH_LEN)..];
    padded[HASH_LEN - tail.len()..].copy_from_slice(tail);
    format!("0x{}", hex::encode(padded))
}

/// Byte identifier transported as base64 and rendered as a hex hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexHash(pub String);

impl Default for HexHash {
    fn default() -> Self {
        Self(hash_hex(&[]))
    }
}

impl<'de> Deserialize<'de> for HexHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let bytes = decode_base64::<D::Error>(&encoded)?;
        Ok(Self(hash_hex(&bytes)))
    }
}

impl From<HexHash> for String {
    fn from(value: HexHash) -> Self {
        value.0
    }
}

/// Render account bytes as a bech32 address. Empty input renders as "".
pub fn bech32_account(bytes: &[u8]) -> Result<String, String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    bech32::encode::<Bech32>(Hrp::parse_unchecked(ACCOUNT_PREFIX), bytes)
        .map_err(|e| format!("invalid account bytes: {e}"))
}

fn decode_base64<E: de::Error>(encoded: &str) -> Result<Vec<u8>, E> {
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| E::custom(format!("invalid base64 bytes: {e}")))
}

/// Account address transported as base64 bytes and rendered as bech32.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountAddress(pub String);

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let bytes = decode_base64::<D::Error>(&encoded)?;
        bech32_account(&bytes).map(Self).map_err(de::Error::custom)
    }
}

impl From<AccountAddress> for String {
    fn from(value: AccountAddress) -> Self {
        value.0
    }
}

/// Deserialize a `u64` sent either as a JSON number or a decimal string.
pub fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Typed view over the attributes of one event.
pub struct Attributes<'a> {
    event: &'a RawEvent,
}

impl<'a> Attributes<'a> {
    /// Wrap an event.
    #[must_use]
    pub const fn new(event: &'a RawEvent) -> Self {
        Self { event }
    }

    fn topic(&self) -> String {
        self.event.kind.clone()
    }

    /// Raw value of an attribute that must be present.
    pub fn required(&self, key: &'static str) -> Result<&'a str, DecodeError> {
        self.event
            .attribute(key)
            .ok_or_else(|| DecodeError::MissingAttribute {
                topic: self.topic(),
                key,
            })
    }

    /// Whether the attribute is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.event.attribute(key).is_some()
    }

    /// Parse a required JSON attribute.
    pub fn json<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, DecodeError> {
        let raw = self.required(key)?;
        serde_json::from_str(raw).map_err(|source| DecodeError::MalformedJson {
            topic: self.topic(),
            key,
            source,
        })
    }

    /// Parse an optional JSON attribute; absent and `null` both yield `None`.
    pub fn optional_json<T: DeserializeOwned>(
        &self,
        key: &'static str,
    ) -> Result<Option<T>, DecodeError> {
        match self.event.attribute(key) {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<Option<T>>(raw).map_err(|source| {
                DecodeError::MalformedJson {
                    topic: self.topic(),
                    key,
                    source,
                }
            }),
        }
    }

    /// Parse a JSON list attribute. Lists are optional: absence and `null`
    /// both decode as empty, while a present non-list value is an error.
    pub fn list<T: DeserializeOwned>(&self, key: &'static str) -> Result<Vec<T>, DecodeError> {
        Ok(self.optional_json(key)?.unwrap_or_default())
    }

    /// A quoted JSON string attribute.
    pub fn string(&self, key: &'static str) -> Result<String, DecodeError> {
        self.json(key)
    }

    /// A string attribute that may or may not be quoted.
    pub fn lenient_string(&self, key: &'static str) -> Result<String, DecodeError> {
        let raw = self.required(key)?;
        Ok(serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string()))
    }

    /// A boolean attribute, quoted or not. Anything but `true`/`false` is invalid.
    pub fn bool(&self, key: &'static str) -> Result<bool, DecodeError> {
        let raw = self.lenient_string(key)?;
        raw.parse().map_err(|_| self.invalid(key, format!("expected bool, got {raw:?}")))
    }

    /// A decimal attribute, quoted or not.
    pub fn decimal(&self, key: &'static str) -> Result<Decimal, DecodeError> {
        let raw = self.lenient_string(key)?;
        parse_decimal(raw.trim()).map_err(|reason| self.invalid(key, reason))
    }

    /// An unsigned integer attribute, quoted or not.
    pub fn u64(&self, key: &'static str) -> Result<u64, DecodeError> {
        let raw = self.lenient_string(key)?;
        raw.trim()
            .parse()
            .map_err(|e| self.invalid(key, format!("expected unsigned integer: {e}")))
    }

    /// A signed integer attribute, quoted or not.
    pub fn i64(&self, key: &'static str) -> Result<i64, DecodeError> {
        let raw = self.lenient_string(key)?;
        raw.trim()
            .parse()
            .map_err(|e| self.invalid(key, format!("expected integer: {e}")))
    }

    /// Build an invalid-attribute error for this event.
    pub fn invalid(&self, key: &'static str, reason: impl Into<String>) -> DecodeError {
        DecodeError::InvalidAttribute {
            topic: self.topic(),
            key,
            reason: reason.into(),
        }
    }
}

/// Parse a decimal string, reporting failures as text.
pub fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("invalid decimal {raw:?}: {e}"))
}
