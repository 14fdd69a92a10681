#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Firetap - Filtered Stream Tap
//!
//! A self-healing client for filtered real-time text feeds. One streaming
//! HTTP connection is held open against the upstream filter endpoint;
//! decoded records are annotated with the watch terms they contain and
//! handed to the consumer over a bounded channel. The connection is
//! forcibly recycled on a timer and transparently redialed after any
//! failure; caller cancellation is the only way a session ends.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure logic with no I/O
//!   - `terms`: Watch terms and matching rules
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Stream pump, connection registry, recycler, line framing
//!   - `signing`: OAuth 1.0a request signing
//!   - `config`: Environment-derived configuration
//!   - `metrics`: Lifecycle counters via the `metrics` facade
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! Upstream feed ───► Stream Pump ───► Delivery Channel ───► Consumer
//!  (signed POST)         │
//!                        │ registers each connection
//!                        ▼
//!                 Connection Registry ◄── Keepalive Recycler (interval)
//!                                     ◄── Cancellation
//! ```
//!
//! Severing the registered connection is the single mechanism behind both
//! keepalive recycling and cancellation: the pump observes the severance as
//! a connection loss and either redials (recycle) or stops (cancellation).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core matching types with no external dependencies.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::terms::WatchTerms;

// Feed client
pub use infrastructure::feed::{
    ConnectionHandle, ConnectionRecycler, ConnectionRegistry, FeedClient, FeedClientConfig,
    FeedError, FramingError, LineFramer, Record, RecyclerConfig,
};

// Configuration
pub use infrastructure::config::{ConfigError, FeedConfig, StreamSettings};

// Signing
pub use infrastructure::signing::{OauthSigner, RequestSigner, SigningCredentials, SigningError};

// Metrics
pub use infrastructure::metrics::describe_metrics;

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
