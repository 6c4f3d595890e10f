// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-runtime
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The dispatch engine: the Ack Controller (§4.E), the middleware engine
//! (§4.F), the Router (§4.G), in-memory stores (§4.H), the assistant
//! sub-router (§4.I), and the built-in middlewares (§4.K). Everything here
//! operates on [`bolt_core::Envelope`] and [`bolt_core::Context`] — it knows
//! nothing about HTTP, WebSockets, or wire verification, which live in the
//! receiver and verify crates.

/// Single-acknowledgement state machine with a deadline timer.
pub mod ack;
/// Assistant thread sub-router and thread-context fallback chain.
pub mod assistant;
/// Reusable, I/O-free filter middlewares.
pub mod builtin;
/// Deadline-derived cancellation signal shared across one pipeline.
pub mod cancel;
/// Assembles the per-envelope [`bolt_core::Context`].
pub mod context_builder;
/// The re-entrant middleware chain and its terminal step.
pub mod middleware;
/// Listener registration and dispatch.
pub mod router;
/// In-memory conversation and thread-context store implementations.
pub mod store;

pub use ack::{AckAwaiter, AckController, ACK_DEADLINE};
pub use assistant::{
    classify_assistant_shape, dispatch_assistant, AssistantHandlers, AssistantShape, InstanceContext,
    ThreadContextResolver,
};
pub use cancel::CancellationToken;
pub use context_builder::ContextBuilder;
pub use middleware::{ErrorRecoveryMiddleware, FromFn, Middleware, MiddlewareChain, Next, Terminal, TerminalFn};
pub use router::{
    terminal as router_terminal, ActionArgs, CommandArgs, EventArgs, HandlerFn, ListenerHandler,
    ListenerRegistration, OptionsArgs, Router, ShortcutArgs, ViewArgs,
};
pub use store::{InMemoryConversationStore, InMemoryThreadContextStore};
