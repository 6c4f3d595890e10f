// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-app
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The top-level `App` facade: wires the Authorize Resolver, Context
//! Builder, global middleware chain, and Router together into the single
//! pipeline every receiver dispatches into (§2's control flow). Receivers
//! never see the authorize/context/middleware/router machinery directly —
//! they hand a classified envelope to whichever `Dispatcher` the app
//! implements.

use async_trait::async_trait;
use bolt_authorize::AuthorizeResolver;
use bolt_config::AppConfig;
use bolt_core::store::ThreadContextStore;
use bolt_core::{AckSlot, ApiClient, ConversationStore, Envelope, EnvelopeKind};
use bolt_runtime::router::{
    ActionArgs, CommandArgs, EventArgs, ListenerRegistration, OptionsArgs, Router, ShortcutArgs,
    ViewArgs,
};
use bolt_runtime::{
    classify_assistant_shape, dispatch_assistant, AckController, AssistantHandlers, AssistantShape,
    CancellationToken, ContextBuilder, ErrorRecoveryMiddleware, InstanceContext, Middleware,
    MiddlewareChain, ThreadContextResolver,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn, Span};

/// Registration-time handle: accumulates listeners and middleware, then
/// [`AppBuilder::build`] freezes them into an [`App`].
pub struct AppBuilder {
    config: AppConfig,
    resolver: Arc<dyn AuthorizeResolver>,
    context_builder: ContextBuilder,
    conversation_store: Option<Arc<dyn ConversationStore>>,
    router: Router,
    extra_middleware: Vec<Arc<dyn Middleware>>,
    assistant_handlers: Option<AssistantHandlers>,
    thread_context_store: Option<Arc<dyn ThreadContextStore>>,
}

impl AppBuilder {
    /// Start building an app around its external collaborators: the
    /// outbound API client and the authorize resolver (§6's "out of
    /// scope" interfaces).
    #[must_use]
    pub fn new(config: AppConfig, client: Arc<dyn ApiClient>, resolver: Arc<dyn AuthorizeResolver>) -> Self {
        Self {
            config,
            resolver,
            context_builder: ContextBuilder::new(client),
            conversation_store: None,
            router: Router::new(),
            extra_middleware: Vec::new(),
            assistant_handlers: None,
            thread_context_store: None,
        }
    }

    /// Attach a conversation store (§4.H). Without one, `Context::conversation`
    /// is always `None` and `Context::update_conversation` always fails.
    #[must_use]
    pub fn with_conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversation_store = Some(store);
        self
    }

    /// Attach the assistant sub-router (§4.I): `handlers` receives the
    /// classified `assistant_thread_started` / `assistant_thread_context_changed`
    /// / user-message-in-IM shapes, and `thread_context_store` backs the
    /// `get_thread_context` / `save_thread_context` memory-cache tier.
    #[must_use]
    pub fn with_assistant(
        mut self,
        handlers: AssistantHandlers,
        thread_context_store: Arc<dyn ThreadContextStore>,
    ) -> Self {
        self.assistant_handlers = Some(handlers);
        self.thread_context_store = Some(thread_context_store);
        self
    }

    /// Append a global middleware, run after `ignore_self` (when enabled)
    /// and before every listener's own chain.
    #[must_use]
    pub fn with_global_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.extra_middleware.push(middleware);
        self
    }

    /// Register an event listener.
    #[must_use]
    pub fn on_event(mut self, registration: ListenerRegistration<EventArgs>) -> Self {
        self.router.on_event(registration);
        self
    }

    /// Register an action listener.
    #[must_use]
    pub fn on_action(mut self, registration: ListenerRegistration<ActionArgs>) -> Self {
        self.router.on_action(registration);
        self
    }

    /// Register a command listener.
    #[must_use]
    pub fn on_command(mut self, registration: ListenerRegistration<CommandArgs>) -> Self {
        self.router.on_command(registration);
        self
    }

    /// Register a shortcut listener.
    #[must_use]
    pub fn on_shortcut(mut self, registration: ListenerRegistration<ShortcutArgs>) -> Self {
        self.router.on_shortcut(registration);
        self
    }

    /// Register a view listener.
    #[must_use]
    pub fn on_view(mut self, registration: ListenerRegistration<ViewArgs>) -> Self {
        self.router.on_view(registration);
        self
    }

    /// Register an options listener.
    #[must_use]
    pub fn on_options(mut self, registration: ListenerRegistration<OptionsArgs>) -> Self {
        self.router.on_options(registration);
        self
    }

    /// Freeze registrations into a running [`App`].
    #[must_use]
    pub fn build(self) -> App {
        let mut layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(ErrorRecoveryMiddleware)];
        if self.config.ignore_self {
            layers.push(bolt_runtime::builtin::ignore_self());
        }
        layers.extend(self.extra_middleware);

        App {
            config: self.config,
            resolver: self.resolver,
            context_builder: self.context_builder,
            conversation_store: self.conversation_store,
            router: Arc::new(self.router),
            global_chain: MiddlewareChain::from_layers(layers),
            assistant_handlers: self.assistant_handlers,
            thread_context_store: self.thread_context_store,
            instance_context: Arc::new(InstanceContext::new()),
        }
    }
}

/// A fully wired application: authorize resolver, context builder, global
/// middleware chain, and router, reachable from any receiver through the
/// [`Dispatcher`] impls below.
pub struct App {
    config: AppConfig,
    resolver: Arc<dyn AuthorizeResolver>,
    context_builder: ContextBuilder,
    conversation_store: Option<Arc<dyn ConversationStore>>,
    router: Arc<Router>,
    global_chain: MiddlewareChain,
    assistant_handlers: Option<AssistantHandlers>,
    thread_context_store: Option<Arc<dyn ThreadContextStore>>,
    instance_context: Arc<InstanceContext>,
}

impl App {
    /// Build a logging subscriber from this app's configuration
    /// (`developer_mode` widens `bolt=info` to `bolt=debug`), the way
    /// a host binary's `main` typically installs one. Left for the host
    /// to call explicitly — a library must not fight the embedding
    /// application's subscriber by calling `.init()` unasked.
    pub fn init_logging(&self) {
        let filter = match (&self.config.log_level, self.config.developer_mode) {
            (Some(level), _) => level.clone(),
            (None, true) => "bolt=debug".to_string(),
            (None, false) => "bolt=info".to_string(),
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .try_init();
    }

    /// Run the full pipeline for one classified envelope: authorize →
    /// context build → assistant sub-router → global middleware → router
    /// dispatch → ack.
    ///
    /// A listener that calls `ctx.set_ack_body` (process-before-respond,
    /// §4.E.3–4) supplies the Ack body; otherwise it defaults to an empty
    /// object.
    pub async fn process_envelope(&self, envelope: Envelope, cancellation: CancellationToken, ack: AckController) {
        let logger = Span::current();

        let auth = match bolt_authorize::authorize(self.resolver.as_ref(), &envelope).await {
            Ok(auth) => auth,
            Err(err) => {
                warn!(target: "bolt.app", %err, "authorization failed, envelope dropped");
                let _ = ack.ack(Value::Object(serde_json::Map::new()));
                return;
            }
        };

        let mut ctx = self.context_builder.build(auth, &envelope, logger);
        if let (Some(store), Some(id)) =
            (&self.conversation_store, envelope.routing.conversation_id.clone())
        {
            ctx = ctx.with_conversation(store.clone(), id).await;
        }

        let ack_slot = Arc::new(AckSlot::new());
        ctx = ctx.with_ack_slot(ack_slot.clone());

        let mut dispatch_envelope = envelope.clone();
        if envelope.kind == EnvelopeKind::Event {
            if let Some(shape) = classify_assistant_shape(&envelope) {
                if let (Some(handlers), Some(store)) =
                    (&self.assistant_handlers, &self.thread_context_store)
                {
                    if let Some((channel_id, thread_ts)) = assistant_thread_key(shape, &envelope) {
                        let resolver = ThreadContextResolver::new(
                            channel_id,
                            thread_ts,
                            store.clone(),
                            self.instance_context.clone(),
                            Some(ctx.client.clone()),
                        );
                        ctx = ctx.with_assistant(Arc::new(resolver));
                        if let Err(err) = dispatch_assistant(handlers, shape, &mut ctx, &envelope).await {
                            error!(target: "bolt.app", %err, "assistant sub-router handler failed");
                        }
                        dispatch_envelope.kind = EnvelopeKind::AssistantEvent;
                    }
                }
            }
        }

        let terminal = bolt_runtime::router::terminal(self.router.clone(), cancellation.clone());
        if let Err(err) = self
            .global_chain
            .run_with(&mut ctx, &dispatch_envelope, &cancellation, terminal)
            .await
        {
            error!(target: "bolt.app", %err, "global middleware chain failed");
        }

        let body = ack_slot.take().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let _ = ack.ack(body);
    }
}

/// Extract the `(channel_id, thread_ts)` pair an assistant shape is scoped
/// to (§4.I): thread-started and context-changed read it from the
/// platform's `assistant_thread` object, a user message reads the plain
/// `channel` / `thread_ts` fields instead.
fn assistant_thread_key(shape: AssistantShape, envelope: &Envelope) -> Option<(String, String)> {
    let event = envelope.body.get("event")?;
    match shape {
        AssistantShape::ThreadStarted | AssistantShape::ThreadContextChanged => {
            let thread = event.get("assistant_thread")?;
            let channel_id = thread.get("channel_id")?.as_str()?.to_string();
            let thread_ts = thread.get("thread_ts")?.as_str()?.to_string();
            Some((channel_id, thread_ts))
        }
        AssistantShape::UserMessage => {
            let channel_id = event.get("channel")?.as_str()?.to_string();
            let thread_ts = event.get("thread_ts")?.as_str()?.to_string();
            Some((channel_id, thread_ts))
        }
    }
}

#[async_trait]
impl bolt_receiver_http::Dispatcher for App {
    async fn dispatch(&self, envelope: Envelope, cancellation: CancellationToken, ack: AckController) {
        self.process_envelope(envelope, cancellation, ack).await;
    }
}

#[async_trait]
impl bolt_receiver_socket::Dispatcher for App {
    async fn dispatch(&self, envelope: Envelope, cancellation: CancellationToken, ack: AckController) {
        self.process_envelope(envelope, cancellation, ack).await;
    }
}

/// Wraps a plain async closure as a listener handler — re-exported so
/// application code registering listeners doesn't need a direct
/// `bolt-runtime` dependency for this one helper.
pub use bolt_runtime::router::HandlerFn;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as local_async_trait;
    use bolt_authorize::{AuthorizeError, AuthorizeParams};
    use bolt_core::envelope::RoutingKeys;
    use bolt_core::{AuthorizationResult, ClientError, Context};
    use bolt_runtime::router::EventArgs;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingClient;
    #[local_async_trait]
    impl ApiClient for RecordingClient {
        async fn call(&self, _m: &str, _t: Option<&str>, _p: BTreeMap<String, Value>) -> Result<Value, ClientError> {
            Ok(json!({}))
        }
    }

    struct StaticResolver;
    #[local_async_trait]
    impl AuthorizeResolver for StaticResolver {
        async fn resolve(&self, params: AuthorizeParams) -> Result<AuthorizationResult, AuthorizeError> {
            Ok(AuthorizationResult {
                bot_token: Some("xoxb-test".to_string()),
                bot_user_id: Some("UBOT".to_string()),
                team_id: params.team_id,
                ..AuthorizationResult::empty()
            })
        }
    }

    fn event_envelope(event_type: &str, user: &str) -> Envelope {
        Envelope {
            kind: EnvelopeKind::Event,
            raw_body: Vec::new(),
            body: json!({ "event": { "type": event_type, "user": user, "text": "hi" } }),
            routing: RoutingKeys { event_type: Some(event_type.to_string()), ..Default::default() },
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        }
    }

    #[tokio::test]
    async fn matching_listener_is_invoked_and_envelope_is_acked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_for_handler = hits.clone();
        let handler = HandlerFn::new(move |_ctx: &mut Context, _args: EventArgs| {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver))
            .on_event(ListenerRegistration::new(bolt_core::Constraint::any(), handler))
            .build();

        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(event_envelope("app_mention", "U1"), cancellation.clone(), controller).await;
        tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignore_self_drops_the_bots_own_events_by_default() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_for_handler = hits.clone();
        let handler = HandlerFn::new(move |_ctx: &mut Context, _args: EventArgs| {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver))
            .on_event(ListenerRegistration::new(bolt_core::Constraint::any(), handler))
            .build();

        let (controller, _awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(event_envelope("message", "UBOT"), cancellation, controller).await;
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listener_supplied_ack_body_reaches_the_ack_response() {
        let handler = HandlerFn::new(|ctx: &mut Context, _args: EventArgs| async move {
            ctx.set_ack_body(json!({ "response_type": "ephemeral" }));
            Ok(())
        });

        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver))
            .on_event(ListenerRegistration::new(bolt_core::Constraint::any(), handler))
            .build();

        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(event_envelope("app_mention", "U1"), cancellation.clone(), controller).await;
        let body = tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();
        assert_eq!(body, json!({ "response_type": "ephemeral" }));
    }

    #[tokio::test]
    async fn assistant_thread_started_invokes_only_the_registered_slot() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_for_handler = hits.clone();
        let handlers = AssistantHandlers::new().on_thread_started(move |_ctx, _envelope| {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let store: Arc<dyn ThreadContextStore> = Arc::new(bolt_runtime::InMemoryThreadContextStore::new());
        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver))
            .with_assistant(handlers, store)
            .build();

        let mut envelope = event_envelope("assistant_thread_started", "U1");
        envelope.body = json!({
            "event": {
                "type": "assistant_thread_started",
                "assistant_thread": { "channel_id": "D1", "thread_ts": "111.222" }
            }
        });

        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(envelope, cancellation.clone(), controller).await;
        tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn assistant_thread_context_round_trips_through_get_and_save() {
        let observed_topic = Arc::new(Mutex::new(None));
        let observed_topic_for_changed = observed_topic.clone();
        let handlers = AssistantHandlers::new()
            .on_thread_started(move |ctx, _envelope| async move {
                ctx.save_thread_context(BTreeMap::from([("topic".to_string(), json!("billing"))]))
                    .await
            })
            .on_thread_context_changed(move |ctx, _envelope| {
                let observed_topic = observed_topic_for_changed.clone();
                async move {
                    let context = ctx.get_thread_context().await;
                    *observed_topic.lock().unwrap() =
                        context.get("topic").and_then(Value::as_str).map(String::from);
                    Ok(())
                }
            });

        let store: Arc<dyn ThreadContextStore> = Arc::new(bolt_runtime::InMemoryThreadContextStore::new());
        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver))
            .with_assistant(handlers, store)
            .build();

        let thread = json!({ "channel_id": "D1", "thread_ts": "111.222" });
        let mut started = event_envelope("assistant_thread_started", "U1");
        started.body = json!({ "event": { "type": "assistant_thread_started", "assistant_thread": thread } });
        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(started, cancellation.clone(), controller).await;
        tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();

        let mut changed = event_envelope("assistant_thread_context_changed", "U1");
        changed.body = json!({ "event": { "type": "assistant_thread_context_changed", "assistant_thread": thread } });
        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(changed, cancellation.clone(), controller).await;
        tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();

        assert_eq!(observed_topic.lock().unwrap().as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn app_uninstalled_skips_authorization_and_still_acks() {
        let app = AppBuilder::new(AppConfig::default(), Arc::new(RecordingClient), Arc::new(StaticResolver)).build();
        let (controller, awaiter) = AckController::with_deadline(Duration::from_secs(1));
        let cancellation = controller.cancellation();
        app.process_envelope(event_envelope("app_uninstalled", "U1"), cancellation.clone(), controller).await;
        let body = tokio::time::timeout(Duration::from_millis(200), awaiter.wait_or_deadline(&cancellation))
            .await
            .unwrap();
        assert!(body.is_object());
    }
}
