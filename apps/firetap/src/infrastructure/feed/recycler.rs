//! Keepalive Recycler
//!
//! Forces a fresh upstream connection on a fixed interval. Long-lived
//! streaming responses go stale server-side and on middleboxes; severing the
//! current connection bounds how long any single connection is trusted. The
//! pump observes the severance as a normal connection loss and redials.
//!
//! The recycler never decodes data and never touches the delivery channel.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::registry::ConnectionRegistry;
use crate::infrastructure::metrics;

/// Default interval between forced recycles.
pub const DEFAULT_RECYCLE_INTERVAL: Duration = Duration::from_secs(120);

/// Configuration for connection recycling.
#[derive(Debug, Clone)]
pub struct RecyclerConfig {
    /// Interval between forced connection closes.
    pub interval: Duration,
}

impl Default for RecyclerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECYCLE_INTERVAL,
        }
    }
}

impl RecyclerConfig {
    /// Create a configuration with a custom interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Background task that severs the current connection on a timer.
///
/// Two wakeup sources: the recycle interval and session cancellation. A
/// timer fire closes the registry's current handle and keeps running; the
/// first fire happens one full interval after start, never immediately.
/// Cancellation closes the current handle once and ends the task.
pub struct ConnectionRecycler {
    config: RecyclerConfig,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
}

impl ConnectionRecycler {
    /// Create a new recycler over the session's registry.
    #[must_use]
    pub const fn new(
        config: RecyclerConfig,
        registry: Arc<ConnectionRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            cancel,
        }
    }

    /// Run the recycle loop until cancelled.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Recycler cancelled, closing current connection");
                    self.registry.close_current();
                    break;
                }
                _ = interval.tick() => {
                    tracing::debug!(
                        connection_id = ?self.registry.current_id(),
                        "Recycling upstream connection"
                    );
                    metrics::record_recycle();
                    self.registry.close_current();
                }
            }
        }
    }
}
