// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable error taxonomy for the Bolt event-processing core.
//!
//! Every error code follows the pattern `BOLT-X###` where `X` is the
//! category letter and `###` is a three-digit number:
//!
//! - **V** — Verification errors (signature, timestamp freshness)
//! - **C** — Classification errors (malformed body, unrecognized shape)
//! - **A** — Authorization errors (resolver failure, missing token)
//! - **D** — Dispatch errors (middleware/listener failure)
//! - **K** — Ack errors (already-acked, deadline exceeded)
//! - **S** — Store errors (conversation / thread-context backends)

use std::fmt;

/// Enumeration of all Bolt error codes, organized by category (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoltErrorCode {
    /// The request signature did not match the computed HMAC.
    SignatureMismatch,
    /// The request timestamp is missing, non-numeric, or stale.
    StaleTimestamp,
    /// The signing secret or signature header was empty.
    MissingSigningMaterial,
    /// The request body could not be parsed as JSON or form data.
    MalformedBody,
    /// The envelope shape did not match any known classification.
    UnclassifiedEnvelope,
    /// The custom Authorize Resolver returned an error.
    ResolverFailed,
    /// No bot token could be resolved for the envelope.
    MissingBotToken,
    /// A middleware in the chain returned an error.
    MiddlewareFailed,
    /// A listener handler returned an error.
    ListenerFailed,
    /// `Ack` was invoked more than once for the same envelope.
    AlreadyAcked,
    /// The 3-second ack deadline elapsed before `Ack` was invoked.
    AckDeadlineExceeded,
    /// The conversation or thread-context store returned an error.
    StoreFailed,
    /// A conversation entry was read after its expiry.
    ConversationExpired,
}

impl BoltErrorCode {
    /// The stable `BOLT-X###` string for this code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureMismatch => "BOLT-V001",
            Self::StaleTimestamp => "BOLT-V002",
            Self::MissingSigningMaterial => "BOLT-V003",
            Self::MalformedBody => "BOLT-C001",
            Self::UnclassifiedEnvelope => "BOLT-C002",
            Self::ResolverFailed => "BOLT-A001",
            Self::MissingBotToken => "BOLT-A002",
            Self::MiddlewareFailed => "BOLT-D001",
            Self::ListenerFailed => "BOLT-D002",
            Self::AlreadyAcked => "BOLT-K001",
            Self::AckDeadlineExceeded => "BOLT-K002",
            Self::StoreFailed => "BOLT-S001",
            Self::ConversationExpired => "BOLT-S002",
        }
    }
}

impl fmt::Display for BoltErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the core pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BoltError {
    /// Request verification failed (§4.B).
    #[error("[{}] request verification failed: {reason}", BoltErrorCode::SignatureMismatch)]
    Verification {
        /// Human-readable detail.
        reason: String,
    },

    /// The Authorize Resolver failed or returned no token (§4.C, §7).
    #[error("[{code}] authorization failed: {reason}")]
    Authorization {
        /// Which of the two authorization failure codes applies.
        code: BoltErrorCode,
        /// Human-readable detail.
        reason: String,
    },

    /// A middleware or listener in the dispatch chain failed (§4.F, §7).
    #[error("[{code}] dispatch failed in '{stage}': {source}")]
    Dispatch {
        /// [`BoltErrorCode::MiddlewareFailed`] or [`BoltErrorCode::ListenerFailed`].
        code: BoltErrorCode,
        /// Name of the middleware or listener that failed.
        stage: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The Ack Controller rejected a second ack attempt (§4.E, §7).
    #[error("[{}] envelope already acknowledged", BoltErrorCode::AlreadyAcked)]
    AlreadyAcked,

    /// The conversation or thread-context store failed (§4.H, §7).
    #[error("[{code}] store operation failed: {reason}")]
    Store {
        /// [`BoltErrorCode::StoreFailed`] or [`BoltErrorCode::ConversationExpired`].
        code: BoltErrorCode,
        /// Human-readable detail.
        reason: String,
    },
}

impl BoltError {
    /// Return the [`BoltErrorCode`] for this error.
    #[must_use]
    pub fn error_code(&self) -> BoltErrorCode {
        match self {
            Self::Verification { .. } => BoltErrorCode::SignatureMismatch,
            Self::Authorization { code, .. } => *code,
            Self::Dispatch { code, .. } => *code,
            Self::AlreadyAcked => BoltErrorCode::AlreadyAcked,
            Self::Store { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_stable_strings() {
        assert_eq!(BoltErrorCode::SignatureMismatch.as_str(), "BOLT-V001");
        assert_eq!(BoltErrorCode::AckDeadlineExceeded.as_str(), "BOLT-K002");
    }

    #[test]
    fn dispatch_error_reports_its_code() {
        let err = BoltError::Dispatch {
            code: BoltErrorCode::ListenerFailed,
            stage: "app_mention".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.error_code(), BoltErrorCode::ListenerFailed);
        assert!(err.to_string().contains("app_mention"));
    }
}
