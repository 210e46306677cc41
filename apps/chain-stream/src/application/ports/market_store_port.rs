//! Market Store Port (Driven Port)
//!
//! Read access to market metadata as recorded in ledger state at a given
//! block height.

use async_trait::async_trait;

use crate::domain::market::MarketMetadata;

/// Ledger state error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// State at the requested height cannot be read.
    #[error("ledger state unavailable at height {height}: {message}")]
    Unavailable {
        /// Requested height.
        height: u64,
        /// Error details.
        message: String,
    },

    /// Backing store could not be loaded.
    #[error("failed to load market registry: {message}")]
    Load {
        /// Error details.
        message: String,
    },
}

/// Port for market lookups against ledger state.
///
/// Each lookup returns `Ok(None)` when no market of that family exists
/// under the ID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Spot market at `height`.
    async fn spot_market(
        &self,
        height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError>;

    /// Derivative market at `height`.
    async fn derivative_market(
        &self,
        height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError>;

    /// Binary options market at `height`.
    async fn binary_options_market(
        &self,
        height: u64,
        market_id: &str,
    ) -> Result<Option<MarketMetadata>, LedgerError>;
}
