// SPDX-License-Identifier: MIT OR Apache-2.0
//! The outbound platform API client contract (§6).
//!
//! The core depends on this trait but never implements it — a concrete
//! client (HTTP calls to the platform's Web API) is an external
//! collaborator supplied by the host application.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Errors an [`ApiClient`] implementation may return.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The platform returned a non-ok response.
    #[error("api call '{method}' failed: {reason}")]
    CallFailed {
        /// Method name that was invoked.
        method: String,
        /// Platform-reported error reason.
        reason: String,
    },
    /// The underlying transport failed (network, serialization, ...).
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

/// The minimal outbound API surface the core requires.
///
/// A single typed method, `call`, through which every platform method name
/// is invoked with a token and a parameter map. Typed helpers (`say`,
/// `respond`, `ack`) compose over this on [`BoundClient`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Invoke `method` against the platform API using `token` for auth.
    async fn call(
        &self,
        method: &str,
        token: Option<&str>,
        params: BTreeMap<String, Value>,
    ) -> Result<Value, ClientError>;
}

/// A client bound to a specific bot token (or left unbound, falling back to
/// whatever token the caller passes explicitly).
///
/// The Context Builder (§4.D) produces one of these per envelope: bound to
/// the resolved bot token when authorization succeeded, or wrapping the
/// global client unchanged otherwise.
#[derive(Clone)]
pub struct BoundClient {
    inner: Arc<dyn ApiClient>,
    token: Option<String>,
}

impl BoundClient {
    /// Wrap `inner`, binding every call to `token` (pass `None` to leave
    /// each call's token unbound).
    #[must_use]
    pub fn new(inner: Arc<dyn ApiClient>, token: Option<String>) -> Self {
        Self { inner, token }
    }

    /// The bound token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Raw passthrough to [`ApiClient::call`] using the bound token.
    pub async fn call(
        &self,
        method: &str,
        params: BTreeMap<String, Value>,
    ) -> Result<Value, ClientError> {
        self.inner.call(method, self.token.as_deref(), params).await
    }

    /// Post a message to a channel — `chat.postMessage` equivalent.
    pub async fn say(&self, channel: &str, text: &str) -> Result<Value, ClientError> {
        let mut params = BTreeMap::new();
        params.insert("channel".to_string(), Value::String(channel.to_string()));
        params.insert("text".to_string(), Value::String(text.to_string()));
        self.call("chat.postMessage", params).await
    }

    /// Post an ephemeral response to a `response_url`-style callback.
    pub async fn respond(&self, response_url: &str, body: Value) -> Result<Value, ClientError> {
        let mut params = BTreeMap::new();
        params.insert(
            "response_url".to_string(),
            Value::String(response_url.to_string()),
        );
        params.insert("body".to_string(), body);
        self.call("chat.respond", params).await
    }
}
