//! Market Metadata
//!
//! Decimal precision of a market's base and quote denominations, and the
//! scaling between human-readable values and the chain's fixed-point
//! representation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Spot market.
    Spot,
    /// Perpetual or expiry futures market.
    Derivative,
    /// Binary options market.
    BinaryOptions,
}

/// Scaling failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    /// The scaled value does not fit a decimal.
    #[error("{field} overflows when scaled by 10^{exponent} for market {market_id}")]
    Overflow {
        /// Market ID.
        market_id: String,
        /// Field being scaled.
        field: &'static str,
        /// Power of ten applied.
        exponent: i32,
    },
}

/// Precision metadata for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMetadata {
    /// Market ID.
    pub market_id: String,
    /// Market family.
    pub kind: MarketKind,
    /// Base denomination decimals. Zero for non-spot markets.
    #[serde(default)]
    pub base_decimals: u32,
    /// Quote denomination decimals.
    pub quote_decimals: u32,
}

impl MarketMetadata {
    /// Power of ten applied to prices.
    #[must_use]
    pub fn price_exponent(&self) -> i32 {
        match self.kind {
            MarketKind::Spot => exp(self.quote_decimals) - exp(self.base_decimals),
            MarketKind::Derivative | MarketKind::BinaryOptions => exp(self.quote_decimals),
        }
    }

    /// Power of ten applied to quantities.
    #[must_use]
    pub fn quantity_exponent(&self) -> i32 {
        match self.kind {
            MarketKind::Spot => exp(self.base_decimals),
            MarketKind::Derivative | MarketKind::BinaryOptions => 0,
        }
    }

    /// Power of ten applied to notional amounts (margin, fees, payouts).
    #[must_use]
    pub fn notional_exponent(&self) -> i32 {
        exp(self.quote_decimals)
    }

    /// Price in chain format.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Overflow`] if the result does not fit.
    pub fn price_to_chain(&self, value: Decimal, field: &'static str) -> Result<Decimal, ScaleError> {
        self.scale(value, self.price_exponent(), field)
    }

    /// Quantity in chain format.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Overflow`] if the result does not fit.
    pub fn quantity_to_chain(
        &self,
        value: Decimal,
        field: &'static str,
    ) -> Result<Decimal, ScaleError> {
        self.scale(value, self.quantity_exponent(), field)
    }

    /// Notional in chain format.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::Overflow`] if the result does not fit.
    pub fn notional_to_chain(
        &self,
        value: Decimal,
        field: &'static str,
    ) -> Result<Decimal, ScaleError> {
        self.scale(value, self.notional_exponent(), field)
    }

    fn scale(&self, value: Decimal, exponent: i32, field: &'static str) -> Result<Decimal, ScaleError> {
        let overflow = || ScaleError::Overflow {
            market_id: self.market_id.clone(),
            field,
            exponent,
        };

        let factor = pow10(exponent.unsigned_abs()).ok_or_else(overflow)?;
        let scaled = if exponent >= 0 {
            value.checked_mul(factor)
        } else {
            value.checked_div(factor)
        };
        scaled.map(|d| d.normalize()).ok_or_else(overflow)
    }
}

fn exp(decimals: u32) -> i32 {
    i32::try_from(decimals).unwrap_or(i32::MAX)
}

fn pow10(exponent: u32) -> Option<Decimal> {
    (0..exponent).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
}
