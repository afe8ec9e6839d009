//! In-flight connection tracking for graceful stop.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Counts open connections so `stop` can wait for them.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionTracker {
    active: watch::Sender<usize>,
}

impl ConnectionTracker {
    pub(crate) fn new() -> Self {
        Self {
            active: watch::Sender::new(0),
        }
    }

    /// Register a connection; it counts until the guard is dropped.
    pub(crate) fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|active| *active += 1);
        ConnectionGuard {
            active: self.active.clone(),
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no connection is open. Returns false on timeout.
    pub(crate) async fn drain(&self, timeout: Duration) -> bool {
        let mut active = self.active.subscribe();
        let drained = tokio::time::timeout(timeout, active.wait_for(|count| *count == 0))
            .await
            .is_ok();

        if drained {
            info!("All callback connections drained");
        } else {
            warn!(
                active = self.active_count(),
                "Drain timeout reached with connections still open"
            );
        }
        drained
    }
}

/// Decrements the connection count on drop.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    active: watch::Sender<usize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|active| *active -= 1);
    }
}
