// SPDX-License-Identifier: MIT OR Apache-2.0
//! The global + per-listener middleware engine (§4.F).
//!
//! A middleware is a function of `(Context, Envelope, next)`. It may act
//! before calling `next`, after, both, or not at all (short-circuiting the
//! chain successfully). Re-expressed here as explicit continuation-passing:
//! each [`Next::run`] call recurses one middleware at a time, so the "after"
//! phase of middleware *i* runs only once every middleware past it has
//! returned from its own `next()` call — forming a stack, per §5's ordering
//! guarantee. The chain's terminal step (Router dispatch, or a listener's
//! handler) is appended as an ordinary final link so the recursion needs no
//! special-cased base case.

use crate::cancel::CancellationToken;
use async_trait::async_trait;
use bolt_core::error::{BoltError, BoltErrorCode};
use bolt_core::{Context, Envelope};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tracing::error;

/// A boxed, `Send` future — the shape every async step in the engine reduces to.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The continuation a middleware calls to advance the chain.
///
/// Dropping a `Next` without calling it terminates the chain successfully
/// (§4.F "short-circuit").
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    cancellation: &'a CancellationToken,
}

impl<'a> Next<'a> {
    /// Run the remainder of the chain against `ctx` and `envelope`.
    pub fn run(self, ctx: &'a mut Context, envelope: &'a Envelope) -> BoxFuture<'a, Result<(), BoltError>> {
        Box::pin(async move {
            if self.cancellation.is_cancelled() {
                return Err(BoltError::Dispatch {
                    code: BoltErrorCode::MiddlewareFailed,
                    stage: "cancellation".to_string(),
                    source: anyhow::anyhow!("pipeline cancelled before deadline"),
                });
            }
            let Some((mw, rest)) = self.remaining.split_first() else {
                return Ok(());
            };
            let next = Next {
                remaining: rest,
                cancellation: self.cancellation,
            };
            mw.handle(ctx, envelope, next).await
        })
    }
}

/// A single processing step in the global or per-listener chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process `envelope`, optionally calling `next.run(..)` to continue.
    async fn handle(&self, ctx: &mut Context, envelope: &Envelope, next: Next<'_>) -> Result<(), BoltError>;

    /// Name used in tracing and in [`BoltError::Dispatch`] `stage` fields.
    fn name(&self) -> &str {
        "middleware"
    }
}

/// The final step of a chain — the Router's dispatch, or a listener's own
/// handler. Unlike [`Middleware`] it has no `next` to call.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Perform the terminal action.
    async fn call(&self, ctx: &mut Context, envelope: &Envelope) -> Result<(), BoltError>;
}

struct TerminalAdapter(Arc<dyn Terminal>);

#[async_trait]
impl Middleware for TerminalAdapter {
    async fn handle(&self, ctx: &mut Context, envelope: &Envelope, _next: Next<'_>) -> Result<(), BoltError> {
        self.0.call(ctx, envelope).await
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

/// Wraps a plain async closure as a [`Terminal`], for callers that don't
/// need a named type.
pub struct TerminalFn<F>(F);

impl<F, Fut> TerminalFn<F>
where
    F: Fn(&mut Context, &Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send + 'static,
{
    /// Wrap `f` as a [`Terminal`].
    #[must_use]
    pub fn new(f: F) -> Arc<dyn Terminal> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F, Fut> Terminal for TerminalFn<F>
where
    F: Fn(&mut Context, &Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send + 'static,
{
    async fn call(&self, ctx: &mut Context, envelope: &Envelope) -> Result<(), BoltError> {
        (self.0)(ctx, envelope).await
    }
}

/// An ordered, immutable chain of middlewares.
#[derive(Clone)]
pub struct MiddlewareChain {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareChain {
    /// An empty chain — running it invokes only the terminal step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Arc::new(Vec::new()),
        }
    }

    /// Build a chain from an ordered list of middlewares.
    #[must_use]
    pub fn from_layers(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            layers: Arc::new(layers),
        }
    }

    /// Append a middleware, returning a new chain (builder pattern).
    #[must_use]
    pub fn with(&self, middleware: Arc<dyn Middleware>) -> Self {
        let mut layers = (*self.layers).clone();
        layers.push(middleware);
        Self {
            layers: Arc::new(layers),
        }
    }

    /// Number of middlewares in the chain (excluding any terminal step).
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// `true` when the chain has no middlewares.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run the full chain, finally invoking `terminal` once every middleware
    /// has called `next()`.
    pub async fn run_with(
        &self,
        ctx: &mut Context,
        envelope: &Envelope,
        cancellation: &CancellationToken,
        terminal: Arc<dyn Terminal>,
    ) -> Result<(), BoltError> {
        let mut layers: Vec<Arc<dyn Middleware>> = (*self.layers).clone();
        layers.push(Arc::new(TerminalAdapter(terminal)));
        let next = Next {
            remaining: &layers,
            cancellation,
        };
        next.run(ctx, envelope).await
    }
}

/// Wraps a middleware closure of the `(ctx, envelope, next) -> fut` shape,
/// for registering simple middlewares without a named type.
pub struct FromFn<F>(F);

impl<F, Fut> FromFn<F>
where
    F: Fn(&mut Context, &Envelope, Next<'_>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send,
{
    /// Wrap `f` as a [`Middleware`].
    #[must_use]
    pub fn new(f: F) -> Arc<dyn Middleware> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(&mut Context, &Envelope, Next<'_>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoltError>> + Send,
{
    async fn handle(&self, ctx: &mut Context, envelope: &Envelope, next: Next<'_>) -> Result<(), BoltError> {
        (self.0)(ctx, envelope, next).await
    }

    fn name(&self) -> &str {
        "from_fn"
    }
}

/// Wraps the remaining chain so that a panicking middleware becomes a
/// [`BoltError::Dispatch`] instead of unwinding across the async runtime.
///
/// Register this first in the global chain to bound the blast radius of a
/// misbehaving middleware or listener.
pub struct ErrorRecoveryMiddleware;

#[async_trait]
impl Middleware for ErrorRecoveryMiddleware {
    async fn handle(&self, ctx: &mut Context, envelope: &Envelope, next: Next<'_>) -> Result<(), BoltError> {
        // `Context` holds trait objects and async handles that aren't
        // `UnwindSafe`; we never inspect state after a caught panic, only
        // convert it to an error, so asserting unwind-safety here is sound.
        match AssertUnwindSafe(next.run(ctx, envelope)).catch_unwind().await {
            Ok(inner) => inner,
            Err(panic) => {
                let reason = panic_message(&panic);
                error!(target: "bolt.runtime.middleware", %reason, "middleware chain panicked");
                Err(BoltError::Dispatch {
                    code: BoltErrorCode::MiddlewareFailed,
                    stage: "panic".to_string(),
                    source: anyhow::anyhow!("middleware panicked: {reason}"),
                })
            }
        }
    }

    fn name(&self) -> &str {
        "error_recovery"
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
