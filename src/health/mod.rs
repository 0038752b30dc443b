// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Connectivity monitoring.
//!
//! Tracks a single boolean: whether the backend service is currently
//! reachable. The flag is updated synchronously on health probe outcomes and
//! incidentally whenever any transport call fails with a connection-level
//! error. The monitor never initiates retries itself; callers consume it to
//! gate chat and resource affordances while the service is down.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Passive reachability signal for the backend service.
///
/// Only connection-level failures flip the flag to unreachable; a server
/// error or a malformed body means the service is up but misbehaving, which
/// is a different user-facing condition.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    reachable: AtomicBool,
    notify_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor that starts out optimistic (reachable) so UI
    /// affordances are not gated before the first call resolves.
    pub fn new() -> Self {
        let (notify_tx, _) = watch::channel(true);
        Self {
            reachable: AtomicBool::new(true),
            notify_tx,
        }
    }

    /// Current reachability.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Subscribe to reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.notify_tx.subscribe()
    }

    /// Record a successful exchange with the backend.
    pub fn record_success(&self) {
        self.set_reachable(true);
    }

    /// Record a connection-level failure (refused/reset).
    pub fn record_unreachable(&self) {
        self.set_reachable(false);
    }

    fn set_reachable(&self, reachable: bool) {
        let previous = self.reachable.swap(reachable, Ordering::SeqCst);
        if previous != reachable {
            tracing::info!(
                target: "health",
                reachable,
                "Backend connectivity changed"
            );
            let _ = self.notify_tx.send(reachable);
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_reachable() {
        let monitor = ConnectivityMonitor::new();
        assert!(monitor.is_reachable());
    }

    #[test]
    fn test_unreachable_then_recovers() {
        let monitor = ConnectivityMonitor::new();
        monitor.record_unreachable();
        assert!(!monitor.is_reachable());
        monitor.record_success();
        assert!(monitor.is_reachable());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let monitor = ConnectivityMonitor::new();
        let mut rx = monitor.subscribe();

        monitor.record_unreachable();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());

        monitor.record_success();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_repeated_outcomes_are_idempotent() {
        let monitor = ConnectivityMonitor::new();
        monitor.record_success();
        monitor.record_success();
        assert!(monitor.is_reachable());
        monitor.record_unreachable();
        monitor.record_unreachable();
        assert!(!monitor.is_reachable());
    }
}
