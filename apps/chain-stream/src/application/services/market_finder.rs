//! Market Resolver
//!
//! Read-through cache over the [`MarketStore`] port, created per
//! subscription. Entries are keyed by `(height, market_id)`; moving to a
//! newer height drops everything cached for older ones.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::application::ports::{LedgerError, MarketStore};
use crate::domain::market::MarketMetadata;

/// Market lookup failures.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// No spot market under the ID.
    #[error("spot market doesn't exist {market_id}")]
    SpotMarketNotFound {
        /// Market ID.
        market_id: String,
    },

    /// No market of any family under the ID.
    #[error("market for marketID {market_id} not found")]
    MarketNotFound {
        /// Market ID.
        market_id: String,
    },

    /// Ledger state could not be read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Spot,
    Any,
}

#[derive(Debug, Default)]
struct Cache {
    height: u64,
    entries: HashMap<(Scope, String), MarketMetadata>,
}

/// Memoizing market resolver.
pub struct CachedMarketFinder {
    store: Arc<dyn MarketStore>,
    cache: Mutex<Cache>,
}

impl std::fmt::Debug for CachedMarketFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("CachedMarketFinder")
            .field("height", &cache.height)
            .field("entries", &cache.entries.len())
            .finish_non_exhaustive()
    }
}

impl CachedMarketFinder {
    /// Create an empty cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Spot market `market_id` at `height`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::SpotMarketNotFound`] when absent and
    /// [`ResolverError::Ledger`] when the store fails.
    pub async fn find_spot_market(
        &self,
        height: u64,
        market_id: &str,
    ) -> Result<MarketMetadata, ResolverError> {
        if let Some(market) = self.cached(Scope::Spot, height, market_id) {
            return Ok(market);
        }

        let market = self
            .store
            .spot_market(height, market_id)
            .await?
            .ok_or_else(|| ResolverError::SpotMarketNotFound {
                market_id: market_id.to_string(),
            })?;

        self.remember(Scope::Spot, height, market_id, &market);
        Ok(market)
    }

    /// Market `market_id` at `height`, trying spot, derivative and binary
    /// options markets in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::MarketNotFound`] when no family has it and
    /// [`ResolverError::Ledger`] when the store fails.
    pub async fn find_market(
        &self,
        height: u64,
        market_id: &str,
    ) -> Result<MarketMetadata, ResolverError> {
        if let Some(market) = self.cached(Scope::Any, height, market_id) {
            return Ok(market);
        }

        let market = match self.store.spot_market(height, market_id).await? {
            Some(market) => Some(market),
            None => match self.store.derivative_market(height, market_id).await? {
                Some(market) => Some(market),
                None => self.store.binary_options_market(height, market_id).await?,
            },
        }
        .ok_or_else(|| ResolverError::MarketNotFound {
            market_id: market_id.to_string(),
        })?;

        self.remember(Scope::Any, height, market_id, &market);
        Ok(market)
    }

    fn cached(&self, scope: Scope, height: u64, market_id: &str) -> Option<MarketMetadata> {
        let cache = self.cache.lock();
        if cache.height != height {
            return None;
        }
        cache.entries.get(&(scope, market_id.to_string())).cloned()
    }

    fn remember(&self, scope: Scope, height: u64, market_id: &str, market: &MarketMetadata) {
        let mut cache = self.cache.lock();
        if height > cache.height {
            cache.height = height;
            cache.entries.clear();
        }
        // Lookups for heights already passed are served but not kept.
        if height == cache.height {
            cache
                .entries
                .insert((scope, market_id.to_string()), market.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockMarketStore;
    use crate::domain::market::MarketKind;

    fn market(id: &str, kind: MarketKind) -> MarketMetadata {
        MarketMetadata {
            market_id: id.to_string(),
            kind,
            base_decimals: 18,
            quote_decimals: 6,
        }
    }

    #[tokio::test]
    async fn spot_lookup_is_memoized_per_height() {
        let mut store = MockMarketStore::new();
        store
            .expect_spot_market()
            .withf(|height, id| *height == 9 && id == "m1")
            .times(1)
            .returning(|_, id| Ok(Some(market(id, MarketKind::Spot))));
        let finder = CachedMarketFinder::new(Arc::new(store));

        let first = finder.find_spot_market(9, "m1").await.unwrap();
        let second = finder.find_spot_market(9, "m1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.kind, MarketKind::Spot);
    }

    #[tokio::test]
    async fn newer_height_evicts_cache() {
        let mut store = MockMarketStore::new();
        store
            .expect_spot_market()
            .times(3)
            .returning(|_, id| Ok(Some(market(id, MarketKind::Spot))));
        let finder = CachedMarketFinder::new(Arc::new(store));

        finder.find_spot_market(1, "m1").await.unwrap();
        finder.find_spot_market(2, "m1").await.unwrap();
        finder.find_spot_market(2, "m1").await.unwrap();
        finder.find_spot_market(1, "m1").await.unwrap();
    }

    #[tokio::test]
    async fn find_market_falls_through_families() {
        let mut store = MockMarketStore::new();
        store.expect_spot_market().returning(|_, _| Ok(None));
        store.expect_derivative_market().returning(|_, _| Ok(None));
        store
            .expect_binary_options_market()
            .times(1)
            .returning(|_, id| Ok(Some(market(id, MarketKind::BinaryOptions))));
        let finder = CachedMarketFinder::new(Arc::new(store));

        let found = finder.find_market(4, "bo").await.unwrap();
        assert_eq!(found.kind, MarketKind::BinaryOptions);
        finder.find_market(4, "bo").await.unwrap();
    }

    #[tokio::test]
    async fn missing_markets_are_errors() {
        let mut store = MockMarketStore::new();
        store.expect_spot_market().returning(|_, _| Ok(None));
        store.expect_derivative_market().returning(|_, _| Ok(None));
        store.expect_binary_options_market().returning(|_, _| Ok(None));
        let finder = CachedMarketFinder::new(Arc::new(store));

        let spot = finder.find_spot_market(1, "x").await.unwrap_err();
        assert_eq!(spot.to_string(), "spot market doesn't exist x");

        let any = finder.find_market(1, "x").await.unwrap_err();
        assert_eq!(any.to_string(), "market for marketID x not found");
    }

    #[tokio::test]
    async fn ledger_errors_propagate() {
        let mut store = MockMarketStore::new();
        store.expect_spot_market().returning(|height, _| {
            Err(LedgerError::Unavailable {
                height,
                message: "pruned".into(),
            })
        });
        let finder = CachedMarketFinder::new(Arc::new(store));

        let err = finder.find_spot_market(3, "m1").await.unwrap_err();
        assert!(matches!(err, ResolverError::Ledger(_)));
        assert!(err.to_string().contains("pruned"));
    }
}
