//! Gas Price Port (Driven Port)
//!
//! Current base fee reported alongside v2 responses.

/// Source of the current gas price.
pub trait GasPriceSource: Send + Sync {
    /// Current gas price as a decimal string.
    fn current_gas_price(&self) -> String;
}

/// Fixed gas price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGasPrice(String);

impl StaticGasPrice {
    /// Report `price` for every block.
    #[must_use]
    pub fn new(price: impl Into<String>) -> Self {
        Self(price.into())
    }
}

impl GasPriceSource for StaticGasPrice {
    fn current_gas_price(&self) -> String {
        self.0.clone()
    }
}
