// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-acknowledgement state machine with a deadline timer (§4.E).
//!
//! `AckController` wraps whatever single Ack closure the receiver owns. It
//! is transport-agnostic: receivers decide *when* to consult the paired
//! [`AckAwaiter`] (process-before-respond) or not (respond-then-process);
//! the controller only enforces "at most once" and the deadline signal.

use crate::cancel::CancellationToken;
use bolt_core::error::{BoltError, BoltErrorCode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::warn;

/// The default deadline the platform allows before a response is expected.
pub const ACK_DEADLINE: std::time::Duration = std::time::Duration::from_secs(3);

/// Enforces single-ack and exposes the deadline signal for one envelope.
#[derive(Clone)]
pub struct AckController {
    sent: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
    deadline: CancellationToken,
}

/// The receiver-side handle used to observe the eventual Ack body.
pub struct AckAwaiter {
    receiver: oneshot::Receiver<Value>,
}

impl AckController {
    /// Build a controller paired with its [`AckAwaiter`], deriving the
    /// deadline cancellation from `ACK_DEADLINE`.
    #[must_use]
    pub fn new() -> (Self, AckAwaiter) {
        Self::with_deadline(ACK_DEADLINE)
    }

    /// As [`Self::new`], with an explicit deadline (used by tests).
    #[must_use]
    pub fn with_deadline(deadline: std::time::Duration) -> (Self, AckAwaiter) {
        let (tx, rx) = oneshot::channel();
        let controller = Self {
            sent: Arc::new(AtomicBool::new(false)),
            sender: Arc::new(Mutex::new(Some(tx))),
            deadline: CancellationToken::with_deadline(deadline),
        };
        (controller, AckAwaiter { receiver: rx })
    }

    /// The cancellation token derived from this envelope's Ack deadline,
    /// threaded through the Context for suspension points to observe (§5).
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.deadline.clone()
    }

    /// `true` once the deadline has elapsed, regardless of whether Ack has
    /// since been called.
    #[must_use]
    pub fn is_deadline_expired(&self) -> bool {
        self.deadline.is_cancelled()
    }

    /// Acknowledge the envelope with `body`.
    ///
    /// # Errors
    ///
    /// Returns [`BoltError::AlreadyAcked`] if this is not the first call.
    pub fn ack(&self, body: Value) -> Result<(), BoltError> {
        if self.sent.swap(true, Ordering::SeqCst) {
            return Err(BoltError::AlreadyAcked);
        }
        if self.is_deadline_expired() {
            warn!(
                target: "bolt.runtime.ack",
                code = %BoltErrorCode::AckDeadlineExceeded,
                "ack deadline already elapsed; honoring the late ack anyway"
            );
        }
        let sender = self.sender.lock().expect("ack sender lock poisoned").take();
        if let Some(sender) = sender {
            let _ = sender.send(body);
        }
        Ok(())
    }
}

impl Default for AckController {
    fn default() -> Self {
        Self::new().0
    }
}

impl AckAwaiter {
    /// Wait for Ack to be called, falling back to an empty body once the
    /// deadline elapses — the shape a process-before-respond receiver needs
    /// (§4.E mode 2).
    pub async fn wait_or_deadline(self, deadline: &CancellationToken) -> Value {
        tokio::select! {
            body = self.receiver => body.unwrap_or(Value::Null),
            () = deadline.cancelled() => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_ack_succeeds_second_is_rejected() {
        let (controller, _awaiter) = AckController::new();
        assert!(controller.ack(serde_json::json!({})).is_ok());
        let err = controller.ack(serde_json::json!({})).unwrap_err();
        assert_eq!(err.error_code(), BoltErrorCode::AlreadyAcked);
    }

    #[tokio::test]
    async fn awaiter_observes_the_acked_body() {
        let (controller, awaiter) = AckController::new();
        let cancellation = controller.cancellation();
        controller.ack(serde_json::json!({"ok": true})).unwrap();
        let body = awaiter.wait_or_deadline(&cancellation).await;
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn awaiter_falls_back_to_null_after_deadline() {
        let (controller, awaiter) = AckController::with_deadline(std::time::Duration::from_millis(10));
        let cancellation = controller.cancellation();
        tokio::time::advance(std::time::Duration::from_millis(20)).await;
        let body = awaiter.wait_or_deadline(&cancellation).await;
        assert_eq!(body, Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn late_ack_after_deadline_is_still_honored() {
        let (controller, _awaiter) = AckController::with_deadline(std::time::Duration::from_millis(10));
        tokio::time::advance(std::time::Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(controller.is_deadline_expired());
        assert!(controller.ack(serde_json::json!({})).is_ok());
    }
}
