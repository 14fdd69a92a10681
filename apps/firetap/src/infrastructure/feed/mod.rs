//! Streaming Feed Adapter
//!
//! Implements the upstream connection lifecycle:
//!
//! - **Registry**: the single slot holding the current connection handle
//! - **Recycler**: periodic forced connection recycling
//! - **Framing**: newline-delimited JSON line extraction
//! - **Client**: the reconnecting stream pump and session wiring

pub mod client;
pub mod framing;
pub mod record;
pub mod recycler;
pub mod registry;

pub use client::{FeedClient, FeedClientConfig, FeedError};
pub use framing::{FramingError, LineFramer};
pub use record::Record;
pub use recycler::{ConnectionRecycler, RecyclerConfig};
pub use registry::{ConnectionHandle, ConnectionRegistry};
