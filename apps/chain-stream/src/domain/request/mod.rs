//! Stream Requests
//!
//! Canonical, protocol-independent subscription filters. Both wire versions
//! convert into [`StreamRequest`]; a `None` filter means the collection is
//! not streamed at all.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::filter::WILDCARD;

/// Request validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Every filter is unset.
    #[error("at least one filter must be set")]
    NoFilter,
}

/// Filter over account addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsFilter {
    /// Account addresses or the wildcard.
    pub accounts: Vec<String>,
}

/// Filter over subaccount IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubaccountsFilter {
    /// Subaccount IDs or the wildcard.
    pub subaccount_ids: Vec<String>,
}

/// Filter over market IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketsFilter {
    /// Market IDs or the wildcard.
    pub market_ids: Vec<String>,
}

/// Filter over oracle symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolsFilter {
    /// Symbols or the wildcard.
    pub symbol: Vec<String>,
}

/// Two-dimensional filter for collections indexed by market and subaccount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSubaccountFilter {
    /// Market IDs or the wildcard.
    pub market_ids: Vec<String>,
    /// Subaccount IDs or the wildcard.
    pub subaccount_ids: Vec<String>,
}

impl MarketSubaccountFilter {
    /// Wildcard on both dimensions.
    #[must_use]
    pub fn all() -> Self {
        Self {
            market_ids: wildcard(),
            subaccount_ids: wildcard(),
        }
    }
}

fn wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

/// Subscription filters, fixed for the lifetime of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Bank balances.
    pub bank_balances: Option<AccountsFilter>,
    /// Subaccount deposits.
    pub subaccount_deposits: Option<SubaccountsFilter>,
    /// Spot trades.
    pub spot_trades: Option<MarketSubaccountFilter>,
    /// Derivative trades.
    pub derivative_trades: Option<MarketSubaccountFilter>,
    /// Spot orders.
    pub spot_orders: Option<MarketSubaccountFilter>,
    /// Derivative orders.
    pub derivative_orders: Option<MarketSubaccountFilter>,
    /// Spot orderbook updates.
    pub spot_orderbooks: Option<MarketsFilter>,
    /// Derivative orderbook updates.
    pub derivative_orderbooks: Option<MarketsFilter>,
    /// Derivative positions.
    pub positions: Option<MarketSubaccountFilter>,
    /// Oracle prices.
    pub oracle_prices: Option<SymbolsFilter>,
    /// Order failures.
    pub order_failures: Option<AccountsFilter>,
    /// Conditional order trigger failures.
    pub conditional_order_trigger_failures: Option<MarketSubaccountFilter>,
}

impl StreamRequest {
    /// Request streaming every collection.
    ///
    /// Bank balances are enabled with an empty account list, so they select
    /// nothing unless narrowed explicitly.
    #[must_use]
    pub fn full() -> Self {
        Self {
            bank_balances: Some(AccountsFilter::default()),
            subaccount_deposits: Some(SubaccountsFilter {
                subaccount_ids: wildcard(),
            }),
            spot_trades: Some(MarketSubaccountFilter::all()),
            derivative_trades: Some(MarketSubaccountFilter::all()),
            spot_orders: Some(MarketSubaccountFilter::all()),
            derivative_orders: Some(MarketSubaccountFilter::all()),
            spot_orderbooks: Some(MarketsFilter {
                market_ids: wildcard(),
            }),
            derivative_orderbooks: Some(MarketsFilter {
                market_ids: wildcard(),
            }),
            positions: Some(MarketSubaccountFilter::all()),
            oracle_prices: Some(SymbolsFilter { symbol: wildcard() }),
            order_failures: Some(AccountsFilter {
                accounts: wildcard(),
            }),
            conditional_order_trigger_failures: Some(MarketSubaccountFilter::all()),
        }
    }

    /// Whether no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bank_balances.is_none()
            && self.subaccount_deposits.is_none()
            && self.spot_trades.is_none()
            && self.derivative_trades.is_none()
            && self.spot_orders.is_none()
            && self.derivative_orders.is_none()
            && self.spot_orderbooks.is_none()
            && self.derivative_orderbooks.is_none()
            && self.positions.is_none()
            && self.oracle_prices.is_none()
            && self.order_failures.is_none()
            && self.conditional_order_trigger_failures.is_none()
    }

    /// Check that at least one filter is set.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoFilter`] for an empty request.
    pub const fn validate(&self) -> Result<(), RequestError> {
        if self.is_empty() {
            Err(RequestError::NoFilter)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_rejected() {
        let err = StreamRequest::default().validate().unwrap_err();
        assert_eq!(err.to_string(), "at least one filter must be set");
    }

    #[test]
    fn a_single_empty_filter_is_enough() {
        let request = StreamRequest {
            oracle_prices: Some(SymbolsFilter::default()),
            ..StreamRequest::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn full_request_sets_every_filter() {
        let request = StreamRequest::full();
        assert!(request.validate().is_ok());
        assert_eq!(
            request.spot_trades.as_ref().map(|f| f.market_ids.clone()),
            Some(vec!["*".to_string()])
        );
        assert!(
            request
                .bank_balances
                .as_ref()
                .is_some_and(|f| f.accounts.is_empty())
        );
    }
}
