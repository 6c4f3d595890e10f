// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable state-store contracts (§3, §4.H, §4.I).
//!
//! `bolt-core` only defines the traits; `bolt-runtime` ships the in-memory
//! implementations the framework uses by default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Errors a [`ConversationStore`] implementation may return.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConversationStoreError {
    /// No entry exists for the given id.
    #[error("no conversation state for this id")]
    NotFound,
    /// An entry exists but its `expires_at` has passed.
    #[error("conversation state expired")]
    Expired,
    /// The backend itself failed (I/O, serialization, ...).
    #[error("conversation store backend error: {0}")]
    Backend(String),
}

/// Keyed conversation-state persistence (§3 Conversation Entry, §4.H).
///
/// A `Get` that observes `now() >= expires_at` MUST fail with
/// [`ConversationStoreError::Expired`] (distinct from [`ConversationStoreError::NotFound`])
/// and MAY remove the entry as a side effect.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist `value` under `id`, optionally expiring at `expires_at`.
    async fn set(
        &self,
        id: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), ConversationStoreError>;

    /// Look up the value stored under `id`.
    async fn get(&self, id: &str) -> Result<Value, ConversationStoreError>;

    /// Remove any entry stored under `id`. Removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), ConversationStoreError>;
}

/// Per-(channel, thread) metadata associated with an assistant conversation
/// (§3 Assistant Thread Context, §4.I).
///
/// This trait models only the durable memory-cache tier; the full fallback
/// chain (memory cache → instance context → platform read → empty) is
/// orchestrated by `bolt_runtime::assistant`.
#[async_trait]
pub trait ThreadContextStore: Send + Sync {
    /// Fetch the cached context map for `(channel_id, thread_ts)`, if any.
    async fn get(&self, channel_id: &str, thread_ts: &str) -> Option<BTreeMap<String, Value>>;

    /// Overwrite the cached context map for `(channel_id, thread_ts)`.
    async fn save(&self, channel_id: &str, thread_ts: &str, context: BTreeMap<String, Value>);
}
