//! Application Ports (Driven)
//!
//! Interfaces to the collaborators the streaming core depends on but does
//! not own: ledger state for market metadata and the fee module for the
//! current gas price.

mod gas_price_port;
mod market_store_port;

pub use gas_price_port::{GasPriceSource, StaticGasPrice};
pub use market_store_port::{LedgerError, MarketStore};

#[cfg(test)]
pub use market_store_port::MockMarketStore;
