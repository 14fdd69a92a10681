//! Connection Registry
//!
//! Single point of truth for the session's current upstream connection.
//! The pump, the recycler, and cancellation handling all act on the same
//! slot: registering a new handle atomically displaces the previous one,
//! and closing the displaced handle unblocks whichever task still reads
//! through it.
//!
//! A [`ConnectionHandle`] does not own a socket directly. It is a severance
//! signal: the pump races every request, body read, and channel send against
//! `closed()`, and dropping the losing branch drops the HTTP response, which
//! closes the underlying connection. Closing a handle therefore ends the
//! transfer it guards regardless of which task triggered the close.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Severance handle for one upstream connection.
///
/// Cloneable; all clones refer to the same connection. Closing any clone
/// severs them all. Carries a session-unique id for log correlation.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    severed: CancellationToken,
}

impl ConnectionHandle {
    fn new(id: u64) -> Self {
        Self {
            id,
            severed: CancellationToken::new(),
        }
    }

    /// Connection id, unique within a registry.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Sever the connection. Idempotent; closing twice is a no-op.
    pub fn close(&self) {
        self.severed.cancel();
    }

    /// Whether the connection has been severed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.severed.is_cancelled()
    }

    /// Wait until the connection is severed.
    pub async fn closed(&self) {
        self.severed.cancelled().await;
    }
}

/// The mutually-exclusive slot holding the current connection handle.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    current: Mutex<Option<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh handle, register it, and close whatever it displaced.
    ///
    /// This is the dial hook the pump calls before each request: after it
    /// returns, the registry reflects the newest connection and any leftover
    /// from a prior attempt is severed.
    pub fn open(&self) -> ConnectionHandle {
        let handle = ConnectionHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Some(displaced) = self.replace(handle.clone()) {
            displaced.close();
        }
        handle
    }

    /// Atomically swap in a new handle, returning the previous occupant.
    ///
    /// The caller must close the returned handle; the registry does not.
    pub fn replace(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.current.lock().replace(handle)
    }

    /// Take the current handle, clear the slot, and close it.
    ///
    /// No-op when the slot is empty.
    pub fn close_current(&self) {
        // Close outside the lock; an interleaved open() at worst re-closes
        // an already-severed handle, which is a no-op.
        let taken = self.current.lock().take();
        if let Some(handle) = taken {
            handle.close();
        }
    }

    /// Id of the current handle, if one is registered.
    #[must_use]
    pub fn current_id(&self) -> Option<u64> {
        self.current.lock().as_ref().map(ConnectionHandle::id)
    }
}
