// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-verify
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Request signature + timestamp freshness verification (§4.B).
//!
//! The verifier computes HMAC-SHA256 over the literal bytes
//! `v0:<timestamp>:<raw_body>` using the app's signing secret, and
//! constant-time compares it against the inbound signature header with its
//! `v0=` prefix stripped. A nil body is treated as an empty byte string.

use bolt_core::error::{BoltError, BoltErrorCode};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How far a request's timestamp may drift from the verifier's clock before
/// it is rejected as stale (§4.B).
pub const MAX_TIMESTAMP_SKEW_SECONDS: i64 = 300;

/// Verifies inbound request signatures against a single signing secret.
///
/// One instance is constructed at app startup and shared across all inbound
/// requests; it holds no per-request state.
#[derive(Clone)]
pub struct RequestVerifier {
    signing_secret: String,
}

impl RequestVerifier {
    /// Build a verifier bound to `signing_secret`.
    #[must_use]
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
        }
    }

    /// Verify `raw_body` against the `X-Bolt-Request-Timestamp` and
    /// `X-Bolt-Signature` header values, using the current wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`BoltError::Verification`] if the timestamp is missing,
    /// non-numeric, stale, or the computed signature does not match.
    pub fn verify(
        &self,
        timestamp_header: &str,
        signature_header: &str,
        raw_body: &[u8],
    ) -> Result<(), BoltError> {
        self.verify_at(Utc::now(), timestamp_header, signature_header, raw_body)
    }

    /// As [`Self::verify`], but against an explicit clock reading — used by
    /// tests to avoid depending on wall-clock time.
    ///
    /// # Errors
    ///
    /// See [`Self::verify`].
    pub fn verify_at(
        &self,
        now: DateTime<Utc>,
        timestamp_header: &str,
        signature_header: &str,
        raw_body: &[u8],
    ) -> Result<(), BoltError> {
        if self.signing_secret.is_empty() || signature_header.is_empty() {
            return Err(verification_error("signing secret or signature header is empty"));
        }

        if timestamp_header.is_empty() {
            return Err(verification_error("request timestamp header is empty"));
        }
        let timestamp: i64 = timestamp_header
            .parse()
            .map_err(|_| verification_error("request timestamp is not numeric"))?;

        let request_time = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| verification_error("request timestamp is out of range"))?;
        let skew = (now - request_time).num_seconds().abs();
        if skew > MAX_TIMESTAMP_SKEW_SECONDS {
            return Err(verification_error(&format!(
                "request timestamp is {skew}s old, outside the {MAX_TIMESTAMP_SKEW_SECONDS}s window"
            )));
        }

        let provided_hex = signature_header
            .strip_prefix("v0=")
            .ok_or_else(|| verification_error("signature header missing 'v0=' prefix"))?;
        let provided_bytes = hex::decode(provided_hex)
            .map_err(|_| verification_error("signature header is not valid hex"))?;

        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|_| verification_error("signing secret has an invalid length"))?;
        mac.update(b"v0:");
        mac.update(timestamp_header.as_bytes());
        mac.update(b":");
        mac.update(raw_body);
        let expected = mac.finalize().into_bytes();

        if expected.as_slice().ct_eq(&provided_bytes).into() {
            Ok(())
        } else {
            Err(verification_error("signature mismatch"))
        }
    }
}

fn verification_error(reason: &str) -> BoltError {
    BoltError::Verification {
        reason: reason.to_string(),
    }
}

/// Helper for callers that need the stable error code without constructing
/// a verifier (e.g. receivers deciding which HTTP status to return).
#[must_use]
pub fn error_code() -> BoltErrorCode {
    BoltErrorCode::SignatureMismatch
}
