//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains everything that touches the outside world: the
//! upstream feed transport, request signing, configuration, and telemetry.

/// Streaming feed client: pump, registry, recycler, framing.
pub mod feed;

/// OAuth 1.0a request signing.
pub mod signing;

/// Configuration loaded from environment variables.
pub mod config;

/// Metrics instrumentation via the `metrics` facade.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
