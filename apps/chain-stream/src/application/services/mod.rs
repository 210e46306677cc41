//! Application Services
//!
//! - `Publisher`: decodes engine batches and publishes one buffer per block
//! - `CachedMarketFinder`: per-subscription market metadata resolver

mod market_finder;
mod publisher;

pub use market_finder::{CachedMarketFinder, ResolverError};
pub use publisher::{
    DEFAULT_PUBLISHER_CAPACITY, OVERFLOW_MESSAGE, Publisher, PublisherError, PublisherState,
};
