// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graceful-shutdown drain guard for in-flight HTTP requests (§4.J, §12.4).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::warn;

/// Tracks in-flight request count and lets shutdown wait for it to drain.
pub struct DrainGuard {
    in_flight: AtomicUsize,
    notify: Notify,
}

impl DrainGuard {
    /// A guard with no requests in flight.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            notify: Notify::new(),
        })
    }

    /// Record the start of one request, returning a permit that records its
    /// end on drop.
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> InFlightPermit {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightPermit { guard: self.clone() }
    }

    /// Wait for every in-flight permit to drop, up to `deadline`.
    ///
    /// Logs a warning and returns early if requests are still in flight once
    /// the deadline elapses.
    pub async fn shutdown(&self, deadline: Duration) {
        let deadline_at = Instant::now() + deadline;
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    target: "bolt.receiver.http",
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    "shutdown deadline elapsed with requests still in flight"
                );
                return;
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }
}

/// RAII permit held for the duration of one in-flight request.
pub struct InFlightPermit {
    guard: Arc<DrainGuard>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        if self.guard.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.guard.notify.notify_waiters();
        }
    }
}
