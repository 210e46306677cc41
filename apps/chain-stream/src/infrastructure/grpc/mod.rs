//! gRPC Streaming Server
//!
//! Serves the chain stream over two protocol versions. Each streaming RPC:
//!
//! 1. Validates the request (at least one filter set)
//! 2. Subscribes to the event bus under a fresh client ID
//! 3. Filters every published block through the request
//! 4. Converts the filtered response to the requested wire version
//! 5. Unsubscribes when the stream ends, for whatever reason
//!
//! v2 carries human-readable decimals. v1 carries chain fixed-point values
//! and needs market metadata to rescale them.

pub mod convert;
pub mod server;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod chainstream {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/chainstream.v1.rs"));
        }
        pub mod v2 {
            include!(concat!(env!("OUT_DIR"), "/chainstream.v2.rs"));
        }
    }
}

pub use convert::ConvertError;
pub use server::{ChainStreamServer, ChainStreamServerConfig};
