// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process store implementations (§4.H, §4.I, §5 shared-resource rules).

use async_trait::async_trait;
use bolt_core::store::{ConversationStore, ConversationStoreError, ThreadContextStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// A mutex-guarded in-memory [`ConversationStore`] (§4.H).
///
/// The default store every app gets unless an external backend is
/// supplied. Shared across pipelines, so it must be internally
/// thread-safe (§5) — a single [`Mutex`] suffices at this scale.
#[derive(Default)]
pub struct InMemoryConversationStore {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl InMemoryConversationStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn set(
        &self,
        id: &str,
        value: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), ConversationStoreError> {
        self.entries
            .lock()
            .map_err(|_| ConversationStoreError::Backend("lock poisoned".to_string()))?
            .insert(id.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Value, ConversationStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ConversationStoreError::Backend("lock poisoned".to_string()))?;
        let Some(entry) = entries.get(id) else {
            return Err(ConversationStoreError::NotFound);
        };
        if let Some(expires_at) = entry.expires_at {
            if Utc::now() >= expires_at {
                entries.remove(id);
                return Err(ConversationStoreError::Expired);
            }
        }
        Ok(entry.value.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), ConversationStoreError> {
        self.entries
            .lock()
            .map_err(|_| ConversationStoreError::Backend("lock poisoned".to_string()))?
            .remove(id);
        Ok(())
    }
}

/// A mutex-guarded in-memory [`ThreadContextStore`] — the "memory cache"
/// tier of the assistant fallback chain (§4.I).
#[derive(Default)]
pub struct InMemoryThreadContextStore {
    entries: Mutex<BTreeMap<(String, String), BTreeMap<String, Value>>>,
}

impl InMemoryThreadContextStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadContextStore for InMemoryThreadContextStore {
    async fn get(&self, channel_id: &str, thread_ts: &str) -> Option<BTreeMap<String, Value>> {
        self.entries
            .lock()
            .expect("thread context lock poisoned")
            .get(&(channel_id.to_string(), thread_ts.to_string()))
            .cloned()
    }

    async fn save(&self, channel_id: &str, thread_ts: &str, context: BTreeMap<String, Value>) {
        self.entries
            .lock()
            .expect("thread context lock poisoned")
            .insert((channel_id.to_string(), thread_ts.to_string()), context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = InMemoryConversationStore::new();
        store.set("C1", serde_json::json!({"count": 5}), None).await.unwrap();
        let value = store.get("C1").await.unwrap();
        assert_eq!(value, serde_json::json!({"count": 5}));
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let store = InMemoryConversationStore::new();
        assert_eq!(store.get("missing").await.unwrap_err(), ConversationStoreError::NotFound);
    }

    #[tokio::test]
    async fn expired_entry_is_removed_on_read() {
        let store = InMemoryConversationStore::new();
        let already_past = Utc::now() - chrono::Duration::seconds(1);
        store.set("C1", serde_json::json!(1), Some(already_past)).await.unwrap();
        assert_eq!(store.get("C1").await.unwrap_err(), ConversationStoreError::Expired);
        assert_eq!(store.get("C1").await.unwrap_err(), ConversationStoreError::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = InMemoryConversationStore::new();
        store.set("C1", serde_json::json!(1), None).await.unwrap();
        store.delete("C1").await.unwrap();
        assert_eq!(store.get("C1").await.unwrap_err(), ConversationStoreError::NotFound);
    }

    #[tokio::test]
    async fn thread_context_roundtrips_by_channel_and_thread() {
        let store = InMemoryThreadContextStore::new();
        assert!(store.get("C1", "1.1").await.is_none());
        let mut ctx = BTreeMap::new();
        ctx.insert("topic".to_string(), serde_json::json!("billing"));
        store.save("C1", "1.1", ctx.clone()).await;
        assert_eq!(store.get("C1", "1.1").await, Some(ctx));
    }
}
