// SPDX-License-Identifier: MIT OR Apache-2.0
//! Listener registries and dispatch (§4.G).
//!
//! Six listener kinds share a registration skeleton but differ in what
//! their handler receives — modeled as a generic [`ListenerHandler<A>`]
//! trait instantiated once per kind's argument bundle, rather than six
//! copy-pasted traits (§9 "listener-handler polymorphism").

use crate::middleware::{MiddlewareChain, Terminal, TerminalFn};
use crate::cancel::CancellationToken;
use async_trait::async_trait;
use bolt_core::envelope::ActionIdentifiers;
use bolt_core::error::BoltError;
use bolt_core::{Constraint, Context, Envelope, EnvelopeKind};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// Args for an `event` listener.
#[derive(Debug, Clone)]
pub struct EventArgs {
    /// The classified envelope.
    pub envelope: Envelope,
}

/// Args for an `action` listener — the one array entry (or legacy single
/// action) that satisfied the constraint.
#[derive(Debug, Clone)]
pub struct ActionArgs {
    /// The classified envelope.
    pub envelope: Envelope,
    /// The matched action's identifiers.
    pub action: ActionIdentifiers,
}

/// Args for a `command` listener.
#[derive(Debug, Clone)]
pub struct CommandArgs {
    /// The classified envelope.
    pub envelope: Envelope,
    /// The slash command name, e.g. `/weather`.
    pub command: String,
    /// The trailing free-text argument.
    pub text: String,
}

/// Args for a `shortcut` listener.
#[derive(Debug, Clone)]
pub struct ShortcutArgs {
    /// The classified envelope.
    pub envelope: Envelope,
    /// `true` for a message shortcut (gets a `say` utility); `false` for
    /// a global shortcut.
    pub is_message_shortcut: bool,
}

/// Args for a `view` listener.
#[derive(Debug, Clone)]
pub struct ViewArgs {
    /// The classified envelope.
    pub envelope: Envelope,
}

/// Args for an `options` listener.
#[derive(Debug, Clone)]
pub struct OptionsArgs {
    /// The classified envelope.
    pub envelope: Envelope,
    /// The matched action's identifiers (the option-source field triplet).
    pub action: ActionIdentifiers,
}

/// A listener handler specialized to one kind's argument bundle `A`.
#[async_trait]
pub trait ListenerHandler<A>: Send + Sync
where
    A: Send + 'static,
{
    /// Handle one matched envelope.
    async fn handle(&self, ctx: &mut Context, args: A) -> Result<(), BoltError>;
}

/// Wraps a plain async closure as a [`ListenerHandler`].
pub struct HandlerFn<F>(F);

impl<F, A, Fut> HandlerFn<F>
where
    F: Fn(&mut Context, A) -> Fut + Send + Sync + 'static,
    A: Send + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send + 'static,
{
    /// Wrap `f` as a [`ListenerHandler<A>`].
    #[must_use]
    pub fn new(f: F) -> Arc<dyn ListenerHandler<A>> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F, A, Fut> ListenerHandler<A> for HandlerFn<F>
where
    F: Fn(&mut Context, A) -> Fut + Send + Sync + 'static,
    A: Send + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send + 'static,
{
    async fn handle(&self, ctx: &mut Context, args: A) -> Result<(), BoltError> {
        (self.0)(ctx, args).await
    }
}

/// `{constraint, handler, chain_middleware}` (§3 Listener Registration).
pub struct ListenerRegistration<A>
where
    A: Send + 'static,
{
    /// The match predicate this listener registered.
    pub constraint: Constraint,
    /// The handler invoked when the constraint matches.
    pub handler: Arc<dyn ListenerHandler<A>>,
    /// Middleware local to this listener's chain, run after the global
    /// chain and before `handler`.
    pub chain_middleware: MiddlewareChain,
}

impl<A: Send + 'static> ListenerRegistration<A> {
    /// Register a listener with no listener-local middleware.
    #[must_use]
    pub fn new(constraint: Constraint, handler: Arc<dyn ListenerHandler<A>>) -> Self {
        Self {
            constraint,
            handler,
            chain_middleware: MiddlewareChain::new(),
        }
    }

    /// Attach listener-local middleware (builder pattern).
    #[must_use]
    pub fn with_chain_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.chain_middleware = chain;
        self
    }
}

/// Holds every registered listener, grouped by kind, and dispatches a
/// classified envelope to the subset whose constraints match.
#[derive(Default)]
pub struct Router {
    events: Vec<ListenerRegistration<EventArgs>>,
    actions: Vec<ListenerRegistration<ActionArgs>>,
    commands: Vec<ListenerRegistration<CommandArgs>>,
    shortcuts: Vec<ListenerRegistration<ShortcutArgs>>,
    views: Vec<ListenerRegistration<ViewArgs>>,
    options: Vec<ListenerRegistration<OptionsArgs>>,
}

impl Router {
    /// A router with no listeners registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event listener. Also reached for [`EnvelopeKind::AssistantEvent`]
    /// re-tagged envelopes built by the assistant sub-router.
    pub fn on_event(&mut self, registration: ListenerRegistration<EventArgs>) {
        self.events.push(registration);
    }

    /// Register an action listener.
    pub fn on_action(&mut self, registration: ListenerRegistration<ActionArgs>) {
        self.actions.push(registration);
    }

    /// Register a command listener.
    pub fn on_command(&mut self, registration: ListenerRegistration<CommandArgs>) {
        self.commands.push(registration);
    }

    /// Register a shortcut listener.
    pub fn on_shortcut(&mut self, registration: ListenerRegistration<ShortcutArgs>) {
        self.shortcuts.push(registration);
    }

    /// Register a view listener.
    pub fn on_view(&mut self, registration: ListenerRegistration<ViewArgs>) {
        self.views.push(registration);
    }

    /// Register an options listener.
    pub fn on_options(&mut self, registration: ListenerRegistration<OptionsArgs>) {
        self.options.push(registration);
    }

    /// Dispatch `envelope` to every matching, registration-ordered listener,
    /// each in its own concurrently-running chain seeded with a clone of
    /// `ctx` (§4.G, §5). Waits for every matched chain to finish before
    /// returning, so a listener that calls `ctx.set_ack_body` has already
    /// done so by the time the caller acks. Returns the number of listeners
    /// invoked.
    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        ctx: &Context,
        cancellation: &CancellationToken,
    ) -> usize {
        match envelope.kind {
            EnvelopeKind::Event | EnvelopeKind::AssistantEvent => {
                self.dispatch_kind(&self.events, envelope, ctx, cancellation, |envelope| {
                    Some(EventArgs { envelope: envelope.clone() })
                })
                .await
            }
            EnvelopeKind::Action => {
                self.dispatch_actions(&self.actions, envelope, ctx, cancellation).await
            }
            EnvelopeKind::Command => {
                self.dispatch_kind(&self.commands, envelope, ctx, cancellation, |envelope| {
                    let (command, text) = envelope.command()?;
                    Some(CommandArgs {
                        envelope: envelope.clone(),
                        command: command.to_string(),
                        text: text.to_string(),
                    })
                })
                .await
            }
            EnvelopeKind::Shortcut => {
                self.dispatch_kind(&self.shortcuts, envelope, ctx, cancellation, |envelope| {
                    let is_message_shortcut = envelope.body.get("type").and_then(serde_json::Value::as_str)
                        == Some("message_action");
                    Some(ShortcutArgs {
                        envelope: envelope.clone(),
                        is_message_shortcut,
                    })
                })
                .await
            }
            EnvelopeKind::View => {
                self.dispatch_kind(&self.views, envelope, ctx, cancellation, |envelope| {
                    Some(ViewArgs { envelope: envelope.clone() })
                })
                .await
            }
            EnvelopeKind::Options => {
                self.dispatch_options(&self.options, envelope, ctx, cancellation).await
            }
        }
    }

    async fn dispatch_kind<A, F>(
        &self,
        registrations: &[ListenerRegistration<A>],
        envelope: &Envelope,
        ctx: &Context,
        cancellation: &CancellationToken,
        make_args: F,
    ) -> usize
    where
        A: Send + Clone + 'static,
        F: Fn(&Envelope) -> Option<A>,
    {
        let mut handles = Vec::new();
        for registration in registrations {
            if !registration.constraint.matches(envelope.kind, envelope) {
                continue;
            }
            let Some(args) = make_args(envelope) else { continue };
            handles.push(spawn_listener(registration, ctx.clone(), envelope.clone(), args, cancellation.clone()));
        }
        let invoked = handles.len();
        if invoked == 0 {
            debug!(target: "bolt.runtime.router", kind = ?envelope.kind, "no listener matched");
        }
        join_listeners(handles).await;
        invoked
    }

    async fn dispatch_actions(
        &self,
        registrations: &[ListenerRegistration<ActionArgs>],
        envelope: &Envelope,
        ctx: &Context,
        cancellation: &CancellationToken,
    ) -> usize {
        let mut handles = Vec::new();
        for registration in registrations {
            let Some(action) = registration.constraint.matching_action(envelope) else {
                continue;
            };
            let args = ActionArgs {
                envelope: envelope.clone(),
                action,
            };
            handles.push(spawn_listener(registration, ctx.clone(), envelope.clone(), args, cancellation.clone()));
        }
        let invoked = handles.len();
        if invoked == 0 {
            debug!(target: "bolt.runtime.router", kind = ?envelope.kind, "no listener matched");
        }
        join_listeners(handles).await;
        invoked
    }

    async fn dispatch_options(
        &self,
        registrations: &[ListenerRegistration<OptionsArgs>],
        envelope: &Envelope,
        ctx: &Context,
        cancellation: &CancellationToken,
    ) -> usize {
        let mut handles = Vec::new();
        for registration in registrations {
            let Some(action) = registration.constraint.matching_action(envelope) else {
                continue;
            };
            let args = OptionsArgs {
                envelope: envelope.clone(),
                action,
            };
            handles.push(spawn_listener(registration, ctx.clone(), envelope.clone(), args, cancellation.clone()));
        }
        let invoked = handles.len();
        if invoked == 0 {
            debug!(target: "bolt.runtime.router", kind = ?envelope.kind, "no listener matched");
        }
        join_listeners(handles).await;
        invoked
    }
}

fn spawn_listener<A>(
    registration: &ListenerRegistration<A>,
    mut ctx: Context,
    envelope: Envelope,
    args: A,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    A: Send + Clone + 'static,
{
    let chain = registration.chain_middleware.clone();
    let handler = registration.handler.clone();
    tokio::spawn(async move {
        let terminal = TerminalFn::new(move |ctx: &mut Context, _envelope: &Envelope| {
            let handler = handler.clone();
            let args = args.clone();
            async move { handler.handle(ctx, args).await }
        });
        if let Err(err) = chain.run_with(&mut ctx, &envelope, &cancellation, terminal).await {
            error!(target: "bolt.runtime.router", %err, "listener chain failed");
        }
    })
}

/// Await every spawned listener chain so the caller observes side effects
/// (including a listener-supplied Ack body) before `dispatch` returns.
/// A listener panic is logged, not propagated — one misbehaving listener
/// must not fail its siblings' dispatch.
async fn join_listeners(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            error!(target: "bolt.runtime.router", %err, "listener task panicked");
        }
    }
}

/// Wrap `router` as the global chain's [`Terminal`], dispatching to
/// per-listener chains under `cancellation` — the same deadline token
/// driving the global chain, so a listener chain observes the same
/// cutoff (§4.F "cancellation").
#[must_use]
pub fn terminal(router: Arc<Router>, cancellation: CancellationToken) -> Arc<dyn Terminal> {
    TerminalFn::new(move |ctx: &mut Context, envelope: &Envelope| {
        let router = router.clone();
        let cancellation = cancellation.clone();
        async move {
            router.dispatch(envelope, ctx, &cancellation).await;
            Ok(())
        }
    })
}
