// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-envelope mutable context threaded through middleware (§3, §4.D).

use crate::auth::AuthorizationResult;
use crate::client::BoundClient;
use crate::error::{BoltError, BoltErrorCode};
use crate::store::ConversationStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::Span;

/// Write-once cell a listener uses to hand its Ack response body back to
/// the receiver that is awaiting the Ack (§4.E.3–4 process-before-respond).
///
/// Kept dependency-free in `bolt-core` so [`Context`] can carry one without
/// `bolt-core` depending on the Ack Controller's home crate. The first
/// `set` wins; later calls are dropped silently, mirroring a listener
/// calling Slack Bolt.js's `ack()` more than once.
#[derive(Default)]
pub struct AckSlot(Mutex<Option<Value>>);

impl AckSlot {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `body` as the Ack response, unless a body was already set.
    pub fn set(&self, body: Value) {
        let mut slot = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(body);
        }
    }

    /// Take the recorded body, if any.
    pub fn take(&self) -> Option<Value> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

/// Per-pipeline access to the assistant thread-context fallback chain
/// (memory cache → instance context → platform read → empty), implemented
/// by `bolt_runtime::assistant`.
///
/// Kept as a trait in `bolt-core` so [`Context`] does not need to depend on
/// `bolt-runtime`.
#[async_trait]
pub trait AssistantContextAccess: Send + Sync {
    /// Resolve the current thread context via the fallback chain (§4.I).
    async fn get_thread_context(&self) -> BTreeMap<String, Value>;

    /// Persist `context` to the memory cache, instance context, and (when a
    /// client is available) the thread's first bot message metadata (§4.I).
    async fn save_thread_context(&self, context: BTreeMap<String, Value>) -> Result<(), BoltError>;
}

/// Mutable, single-threaded-per-pipeline record carried through one
/// envelope's middleware and listener traversal.
///
/// A fresh clone is produced per listener by the Router (§4.G.3) so side
/// effects from one listener's middleware chain never leak into a sibling's.
/// Every field is independently cheap to clone (an `Arc`, a `Span`, or
/// small owned data), so cloning the whole `Context` is cheap too.
#[derive(Clone)]
pub struct Context {
    /// Resolved authorization fields (§3 Authorization Result).
    pub auth: AuthorizationResult,
    /// API client bound to the resolved bot token, or the global client.
    pub client: BoundClient,
    /// Arbitrary per-pipeline key/value map middleware can populate.
    pub custom: BTreeMap<String, Value>,
    /// Pre-loaded conversation state, if a conversation id was extracted
    /// and the store held a non-expired entry.
    pub conversation: Option<Value>,
    /// `function_execution_id`, present for custom-step payloads (§4.D).
    pub function_execution_id: Option<String>,
    /// Tracing span scoping all log output for this envelope's traversal.
    pub logger: Span,

    conversation_store: Option<Arc<dyn ConversationStore>>,
    conversation_id: Option<String>,
    assistant: Option<Arc<dyn AssistantContextAccess>>,
    ack_slot: Option<Arc<AckSlot>>,
}

impl Context {
    /// Construct a context with no conversation or assistant wiring.
    #[must_use]
    pub fn new(auth: AuthorizationResult, client: BoundClient, logger: Span) -> Self {
        Self {
            auth,
            client,
            custom: BTreeMap::new(),
            conversation: None,
            function_execution_id: None,
            logger,
            conversation_store: None,
            conversation_id: None,
            assistant: None,
            ack_slot: None,
        }
    }

    /// Attach a conversation store + id, and pre-load `conversation` from it.
    ///
    /// Mirrors §4.H: `context.conversation = store.get(conversation_id)` —
    /// a store miss or expiry leaves `conversation` as `None` rather than
    /// failing the whole context build.
    pub async fn with_conversation(mut self, store: Arc<dyn ConversationStore>, id: String) -> Self {
        self.conversation = store.get(&id).await.ok();
        self.conversation_store = Some(store);
        self.conversation_id = Some(id);
        self
    }

    /// Attach the assistant thread-context fallback chain.
    #[must_use]
    pub fn with_assistant(mut self, assistant: Arc<dyn AssistantContextAccess>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Attach the Ack response slot, letting a listener supply the Ack body
    /// that process-before-respond (§4.E.3–4) will send back to the
    /// receiver.
    #[must_use]
    pub fn with_ack_slot(mut self, slot: Arc<AckSlot>) -> Self {
        self.ack_slot = Some(slot);
        self
    }

    /// Set this pipeline's Ack response body, e.g. from an `options` or
    /// `view_submission` listener answering directly (§4.E.3–4). A no-op
    /// when no Ack slot is attached, or when a body was already set.
    pub fn set_ack_body(&self, body: Value) {
        if let Some(slot) = &self.ack_slot {
            slot.set(body);
        }
    }

    /// `true` when a conversation id was extracted from the envelope.
    #[must_use]
    pub fn has_conversation_id(&self) -> bool {
        self.conversation_id.is_some()
    }

    /// Persist `value` as the new conversation state, optionally expiring at
    /// `expires_at`. A no-op-with-error when no conversation id was present
    /// on the envelope — §3 describes both fields as "absent" in that case,
    /// which in Rust surfaces as this call failing rather than compiling
    /// away, so a listener that calls it unconditionally gets a clear error.
    ///
    /// # Errors
    ///
    /// Returns [`BoltError::Store`] if no conversation id was extracted, or
    /// if the backing store failed.
    pub async fn update_conversation(
        &self,
        value: Value,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), BoltError> {
        let (store, id) = match (&self.conversation_store, &self.conversation_id) {
            (Some(s), Some(id)) => (s, id),
            _ => {
                return Err(BoltError::Store {
                    code: BoltErrorCode::StoreFailed,
                    reason: "envelope carried no conversation id".to_string(),
                });
            }
        };
        store
            .set(id, value, expires_at)
            .await
            .map_err(|e| BoltError::Store {
                code: BoltErrorCode::StoreFailed,
                reason: e.to_string(),
            })
    }

    /// Resolve the assistant thread context via the fallback chain (§4.I).
    /// Returns an empty map when no assistant wiring is attached.
    pub async fn get_thread_context(&self) -> BTreeMap<String, Value> {
        match &self.assistant {
            Some(a) => a.get_thread_context().await,
            None => BTreeMap::new(),
        }
    }

    /// Persist a thread context via the assistant fallback chain (§4.I).
    ///
    /// # Errors
    ///
    /// Returns [`BoltError::Store`] if no assistant wiring is attached or the
    /// underlying save failed.
    pub async fn save_thread_context(
        &self,
        context: BTreeMap<String, Value>,
    ) -> Result<(), BoltError> {
        match &self.assistant {
            Some(a) => a.save_thread_context(context).await,
            None => Err(BoltError::Store {
                code: BoltErrorCode::StoreFailed,
                reason: "no assistant thread-context wiring attached".to_string(),
            }),
        }
    }
}
