// SPDX-License-Identifier: MIT OR Apache-2.0
//! Assistant thread sub-router and thread-context fallback chain (§4.I).
//!
//! A listener attached as "assistant" opens a nested router selective for
//! three shapes: thread-started, thread-context-changed, and a user message
//! inside an assistant thread. Each gets its own handler slot; an
//! unregistered slot is a no-op.

use async_trait::async_trait;
use bolt_core::error::BoltError;
use bolt_core::{AssistantContextAccess, BoundClient, Envelope};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The per-instance "last seen" tier of the fallback chain — distinct from
/// the shared memory cache in that it only ever holds the most recent
/// context this process observed, not a full keyed table.
#[derive(Default)]
pub struct InstanceContext {
    slot: Mutex<Option<((String, String), BTreeMap<String, Value>)>>,
}

impl InstanceContext {
    /// An instance context holding nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, channel_id: &str, thread_ts: &str) -> Option<BTreeMap<String, Value>> {
        let slot = self.slot.lock().expect("instance context lock poisoned");
        match &*slot {
            Some((key, context)) if key.0 == channel_id && key.1 == thread_ts => Some(context.clone()),
            _ => None,
        }
    }

    fn set(&self, channel_id: &str, thread_ts: &str, context: BTreeMap<String, Value>) {
        *self.slot.lock().expect("instance context lock poisoned") =
            Some(((channel_id.to_string(), thread_ts.to_string()), context));
    }
}

/// Implements the `get_thread_context` / `save_thread_context` fallback
/// chain a [`bolt_core::Context`] exposes to listeners (§4.I).
pub struct ThreadContextResolver {
    channel_id: String,
    thread_ts: String,
    memory: Arc<dyn bolt_core::store::ThreadContextStore>,
    instance: Arc<InstanceContext>,
    client: Option<BoundClient>,
}

impl ThreadContextResolver {
    /// Build a resolver scoped to one `(channel_id, thread_ts)` pair.
    #[must_use]
    pub fn new(
        channel_id: impl Into<String>,
        thread_ts: impl Into<String>,
        memory: Arc<dyn bolt_core::store::ThreadContextStore>,
        instance: Arc<InstanceContext>,
        client: Option<BoundClient>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_ts: thread_ts.into(),
            memory,
            instance,
            client,
        }
    }
}

#[async_trait]
impl AssistantContextAccess for ThreadContextResolver {
    async fn get_thread_context(&self) -> BTreeMap<String, Value> {
        if let Some(context) = self.memory.get(&self.channel_id, &self.thread_ts).await {
            return context;
        }
        if let Some(context) = self.instance.get(&self.channel_id, &self.thread_ts) {
            return context;
        }
        if let Some(client) = &self.client {
            if let Ok(context) = read_first_bot_message_context(client, &self.channel_id, &self.thread_ts).await {
                if let Some(context) = context {
                    return context;
                }
            }
        }
        debug!(
            target: "bolt.runtime.assistant",
            channel_id = %self.channel_id,
            thread_ts = %self.thread_ts,
            "thread context unavailable in any tier; returning empty"
        );
        BTreeMap::new()
    }

    async fn save_thread_context(&self, context: BTreeMap<String, Value>) -> Result<(), BoltError> {
        self.memory.save(&self.channel_id, &self.thread_ts, context.clone()).await;
        self.instance.set(&self.channel_id, &self.thread_ts, context.clone());
        if let Some(client) = &self.client {
            write_first_bot_message_context(client, &self.channel_id, &self.thread_ts, &context).await?;
        }
        Ok(())
    }
}

async fn read_first_bot_message_context(
    client: &BoundClient,
    channel_id: &str,
    thread_ts: &str,
) -> Result<Option<BTreeMap<String, Value>>, BoltError> {
    let mut params = BTreeMap::new();
    params.insert("channel".to_string(), Value::String(channel_id.to_string()));
    params.insert("ts".to_string(), Value::String(thread_ts.to_string()));
    params.insert("limit".to_string(), Value::from(1));
    let response = client
        .call("conversations.replies", params)
        .await
        .map_err(|e| BoltError::Store {
            code: bolt_core::BoltErrorCode::StoreFailed,
            reason: e.to_string(),
        })?;
    let context = response
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
        .and_then(|message| message.get("metadata"))
        .and_then(|metadata| metadata.get("event_payload"))
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    Ok(context)
}

async fn write_first_bot_message_context(
    client: &BoundClient,
    channel_id: &str,
    thread_ts: &str,
    context: &BTreeMap<String, Value>,
) -> Result<(), BoltError> {
    let mut params = BTreeMap::new();
    params.insert("channel".to_string(), Value::String(channel_id.to_string()));
    params.insert("thread_ts".to_string(), Value::String(thread_ts.to_string()));
    params.insert(
        "metadata".to_string(),
        serde_json::json!({
            "event_type": "assistant_thread_context",
            "event_payload": context,
        }),
    );
    client
        .call("assistant.threads.setStatus", params)
        .await
        .map(|_| ())
        .map_err(|e| BoltError::Store {
            code: bolt_core::BoltErrorCode::StoreFailed,
            reason: e.to_string(),
        })
}

type HandlerSlot = Arc<dyn Fn(&mut bolt_core::Context, &Envelope) -> BoxFuture + Send + Sync>;
type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), BoltError>> + Send>>;

/// Handler slots for the three assistant-thread shapes.
#[derive(Default)]
pub struct AssistantHandlers {
    thread_started: Option<HandlerSlot>,
    thread_context_changed: Option<HandlerSlot>,
    user_message: Option<HandlerSlot>,
}

impl AssistantHandlers {
    /// No handlers registered — every shape is a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the `assistant_thread_started` handler.
    #[must_use]
    pub fn on_thread_started<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut bolt_core::Context, &Envelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), BoltError>> + Send + 'static,
    {
        self.thread_started = Some(Arc::new(move |ctx, envelope| Box::pin(f(ctx, envelope))));
        self
    }

    /// Register the `assistant_thread_context_changed` handler.
    #[must_use]
    pub fn on_thread_context_changed<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut bolt_core::Context, &Envelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), BoltError>> + Send + 'static,
    {
        self.thread_context_changed = Some(Arc::new(move |ctx, envelope| Box::pin(f(ctx, envelope))));
        self
    }

    /// Register the user-message-in-assistant-thread handler.
    #[must_use]
    pub fn on_user_message<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut bolt_core::Context, &Envelope) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), BoltError>> + Send + 'static,
    {
        self.user_message = Some(Arc::new(move |ctx, envelope| Box::pin(f(ctx, envelope))));
        self
    }
}

/// Which of the three assistant shapes an event envelope matches, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantShape {
    /// `assistant_thread_started`.
    ThreadStarted,
    /// `assistant_thread_context_changed`.
    ThreadContextChanged,
    /// `message` inside an IM carrying `thread_ts`.
    UserMessage,
}

/// Classify an `Event`-kind envelope against the three assistant shapes
/// (§4.I). Returns `None` for every other event.
#[must_use]
pub fn classify_assistant_shape(envelope: &Envelope) -> Option<AssistantShape> {
    let event_type = envelope.routing.event_type.as_deref()?;
    match event_type {
        "assistant_thread_started" => Some(AssistantShape::ThreadStarted),
        "assistant_thread_context_changed" => Some(AssistantShape::ThreadContextChanged),
        "message" => {
            let event = envelope.body.get("event")?;
            let channel_type = event.get("channel_type").and_then(Value::as_str);
            let thread_ts = event.get("thread_ts").and_then(Value::as_str);
            if channel_type == Some("im") && thread_ts.is_some() {
                Some(AssistantShape::UserMessage)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Dispatch a classified assistant-shape envelope to the matching handler
/// slot, no-op if unregistered (§4.I).
pub async fn dispatch_assistant(
    handlers: &AssistantHandlers,
    shape: AssistantShape,
    ctx: &mut bolt_core::Context,
    envelope: &Envelope,
) -> Result<(), BoltError> {
    let handler = match shape {
        AssistantShape::ThreadStarted => &handlers.thread_started,
        AssistantShape::ThreadContextChanged => &handlers.thread_context_changed,
        AssistantShape::UserMessage => &handlers.user_message,
    };
    match handler {
        Some(f) => f(ctx, envelope).await,
        None => {
            debug!(target: "bolt.runtime.assistant", ?shape, "no handler registered for shape");
            Ok(())
        }
    }
}
