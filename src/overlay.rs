//! Application-scoped loading overlay context.
//!
//! A reference-counted busy indicator: any in-flight operation increments the
//! counter, and the overlay is visible while the counter is positive. The
//! context is constructed once at startup and threaded through composition
//! rather than living in a module-level singleton.

use std::sync::Mutex;

use tokio::sync::watch;

/// Shared loading-overlay state.
pub struct LoadingOverlay {
    count: Mutex<u64>,
    visible_tx: watch::Sender<bool>,
}

impl LoadingOverlay {
    /// Creates a new overlay context with the counter at zero.
    pub fn new() -> Self {
        let (visible_tx, _) = watch::channel(false);
        Self {
            count: Mutex::new(0),
            visible_tx,
        }
    }

    /// Marks one more operation as in flight.
    pub fn increment(&self) {
        let mut count = self.count.lock().expect("overlay lock poisoned");
        *count += 1;
        let _ = self.visible_tx.send(*count > 0);
    }

    /// Marks one operation as finished. Saturates at zero.
    pub fn decrement(&self) {
        let mut count = self.count.lock().expect("overlay lock poisoned");
        *count = count.saturating_sub(1);
        let _ = self.visible_tx.send(*count > 0);
    }

    /// Subscribes to visibility changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.visible_tx.subscribe()
    }

    /// Returns whether the overlay is currently visible.
    pub fn is_visible(&self) -> bool {
        *self.count.lock().expect("overlay lock poisoned") > 0
    }
}

impl Default for LoadingOverlay {
    fn default() -> Self {
        Self::new()
    }
}
