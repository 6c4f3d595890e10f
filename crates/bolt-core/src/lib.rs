// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable data model shared by every Bolt crate: the classified
//! [`Envelope`], the per-pipeline [`Context`], the [`ApiClient`] and store
//! contracts collaborators implement, and the `BOLT-X###` error taxonomy.
//!
//! If you only take one dependency, take this one.

/// Authorization result carried on [`Context`].
pub mod auth;
/// The outbound platform API client contract.
pub mod client;
/// The per-envelope mutable [`Context`].
pub mod context;
/// Stable `BOLT-X###` error taxonomy.
pub mod error;
/// The classified [`Envelope`] shape.
pub mod envelope;
/// Listener match constraints.
pub mod listener;
/// Pluggable conversation / thread-context store contracts.
pub mod store;

/// Contract version embedded in structured log output across Bolt crates.
pub const CONTRACT_VERSION: &str = "bolt/v1";

pub use auth::AuthorizationResult;
pub use client::{ApiClient, BoundClient, ClientError};
pub use context::{AckSlot, AssistantContextAccess, Context};
pub use envelope::{ActionIdentifiers, Envelope, EnvelopeKind, RoutingKeys};
pub use error::{BoltError, BoltErrorCode};
pub use listener::{Constraint, ShortcutConstraintKind, StringMatch, ViewConstraintKind};
pub use store::{ConversationStore, ConversationStoreError, ThreadContextStore};
