//! File-Backed Market Registry
//!
//! [`MarketStore`] adapter over a JSON array of [`MarketMetadata`]. The
//! registry is not versioned, so every height sees the same markets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{LedgerError, MarketStore};
use crate::domain::market::{MarketKind, MarketMetadata};

/// Market registry loaded from a JSON file.
#[derive(Debug, Default)]
pub struct FileMarketStore {
    path: Option<PathBuf>,
    markets: RwLock<HashMap<String, MarketMetadata>>,
}

impl FileMarketStore {
    /// Registry with no markets and no backing file.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding `markets`.
    #[must_use]
    pub fn from_markets(markets: impl IntoIterator<Item = MarketMetadata>) -> Self {
        Self {
            path: None,
            markets: RwLock::new(index(markets)),
        }
    }

    /// Load the registry from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Load`] if the file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let markets = read_registry(&path)?;
        tracing::info!(path = %path.display(), markets = markets.len(), "Market registry loaded");
        Ok(Self {
            path: Some(path),
            markets: RwLock::new(markets),
        })
    }

    /// Re-read the backing file, keeping the current registry on failure.
    ///
    /// Returns the number of markets loaded.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Load`] if the file cannot be read or parsed.
    pub fn reload(&self) -> Result<usize, LedgerError> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };
        let markets = read_registry(path)?;
        let count = markets.len();
        *self.markets.write() = markets;
        tracing::info!(path = %path.display(), markets = count, "Market registry reloaded");
        Ok(count)
    }

    /// Number of known markets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.read().is_empty()
    }

    fn lookup(&self, market_id: &str, kind: MarketKind) -> Option<MarketMetadata> {
        self.markets
            .read()
            .get(market_id)
            .filter(|m| m.kind == kind)
            .cloned()
    }
}

fn index(markets: impl IntoIterator<Item = MarketMetadata>) -> HashMap<String, MarketMetadata> {
    markets
        .into_iter()
        .map(|m| (m.market_id.clone(), m))
        .collect()
}

fn read_registry(path: &Path) -> Result<HashMap<String, MarketMetadata>, LedgerError> {
    let content = std::fs::read_to_string(path).map_err(|e| LedgerError::Load {
        message: format!("{}: {e}", path.display()),
    })?;
    let markets: Vec<MarketMetadata> =
        serde_json::from_str(&content).map_err(|e| LedgerError::Load {
            message: format!("{}: {e}", path.display()),
        })?;
    Ok(index(markets))
}

#[async_trait]
impl MarketStore for FileMarketStore {
    async fn spot_market(
        &self,
        _height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError> {
        Ok(self.lookup(market_id, MarketKind::Spot))
    }

    async fn derivative_market(
        &self,
        _height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError> {
        Ok(self.lookup(market_id, MarketKind::Derivative))
    }

    async fn binary_options_market(
        &self,
        _height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError> {
        Ok(self.lookup(market_id, MarketKind::BinaryOptions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REGISTRY: &str = r#"[
        {"market_id": "0xspot", "kind": "spot", "base_decimals": 18, "quote_decimals": 6},
        {"market_id": "0xperp", "kind": "derivative", "quote_decimals": 6},
        {"market_id": "0xbin", "kind": "binary_options", "quote_decimals": 6}
    ]"#;

    fn registry_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn lookups_respect_market_family() {
        let file = registry_file(REGISTRY);
        let store = FileMarketStore::open(file.path()).unwrap();

        assert_eq!(store.len(), 3);
        let spot = store.spot_market(1, "0xspot").await.unwrap().unwrap();
        assert_eq!(spot.base_decimals, 18);
        assert!(store.spot_market(1, "0xperp").await.unwrap().is_none());
        assert!(store.derivative_market(1, "0xperp").await.unwrap().is_some());
        assert!(store.binary_options_market(9, "0xbin").await.unwrap().is_some());
        assert!(store.derivative_market(1, "0xmissing").await.unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_a_load_error() {
        let file = registry_file("{not json");
        let err = FileMarketStore::open(file.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Load { .. }));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = FileMarketStore::open("/nonexistent/markets.json").unwrap_err();
        assert!(err.to_string().contains("markets.json"));
    }

    #[test]
    fn reload_picks_up_changes_and_keeps_state_on_failure() {
        let file = registry_file(REGISTRY);
        let store = FileMarketStore::open(file.path()).unwrap();

        std::fs::write(
            file.path(),
            r#"[{"market_id": "0xspot", "kind": "spot", "base_decimals": 8, "quote_decimals": 6}]"#,
        )
        .unwrap();
        assert_eq!(store.reload().unwrap(), 1);

        std::fs::write(file.path(), "garbage").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_store_has_no_markets() {
        let store = FileMarketStore::empty();
        assert!(store.is_empty());
        assert_eq!(store.reload().unwrap(), 0);
    }
}
