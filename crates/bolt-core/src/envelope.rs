// SPDX-License-Identifier: MIT OR Apache-2.0
//! The universal envelope shape produced by the classifier.

use serde_json::Value;

/// Discriminator for the seven envelope shapes the core understands.
///
/// The classifier (`bolt-classifier`) only ever produces
/// [`EnvelopeKind::Event`], [`EnvelopeKind::Action`], [`EnvelopeKind::Command`],
/// [`EnvelopeKind::Shortcut`], [`EnvelopeKind::View`], or
/// [`EnvelopeKind::Options`]. [`EnvelopeKind::AssistantEvent`] is never
/// assigned by the classifier; the assistant sub-router re-tags a matching
/// `Event` envelope with it when building the per-listener dispatch context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    /// `event_callback` wrapper — platform events (messages, reactions, ...).
    Event,
    /// Interactive component payload (`block_actions`, `interactive_message`, ...).
    Action,
    /// Slash command invocation.
    Command,
    /// Option-source request (`block_suggestion`, `dialog_suggestion`).
    Options,
    /// View lifecycle payload (`view_submission`, `view_closed`).
    View,
    /// Shortcut invocation (global or message shortcut).
    Shortcut,
    /// An `Event` envelope recognized by the assistant sub-router.
    AssistantEvent,
}

/// Routing keys extracted from the envelope body. Each field uses `None` to
/// mean "absent from the payload" — distinct from an explicit empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingKeys {
    /// Workspace ("team") identifier.
    pub team_id: Option<String>,
    /// Enterprise grid identifier.
    pub enterprise_id: Option<String>,
    /// The user who triggered the envelope.
    pub user_id: Option<String>,
    /// Channel / conversation identifier.
    pub conversation_id: Option<String>,
    /// `event.type` for `event_callback` envelopes.
    pub event_type: Option<String>,
}

/// An immutable, classified inbound envelope.
///
/// Constructed once by the classifier and never mutated afterwards, with one
/// exception: the assistant sub-router re-tags a clone's `kind` to
/// [`EnvelopeKind::AssistantEvent`] before it reaches the Router (see that
/// variant's docs). The Router in turn clones a fresh [`crate::Context`]
/// per listener, not the envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Which of the seven shapes this envelope represents.
    pub kind: EnvelopeKind,
    /// The raw bytes exactly as received, used for signature verification.
    pub raw_body: Vec<u8>,
    /// The parsed JSON document (or synthesized document for form bodies).
    pub body: Value,
    /// Routing keys extracted during classification.
    pub routing: RoutingKeys,
    /// Retry attempt number, if the platform marked this as a redelivery.
    pub retry_num: Option<u32>,
    /// Retry reason string, if present.
    pub retry_reason: Option<String>,
    /// `true` when the installing entity is an enterprise (grid-wide install).
    pub is_enterprise_install: bool,
    /// `function_execution_id`, present for custom-step payloads.
    pub function_execution_id: Option<String>,
    /// `app_installed_team_id`, mirrored verbatim into `Context::custom`.
    pub app_installed_team_id: Option<String>,
}

impl Envelope {
    /// Returns `true` if this event's `event.type` is one of the two types
    /// that bypass authorization entirely (§4.C).
    #[must_use]
    pub fn skips_authorization(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Event)
            && matches!(
                self.routing.event_type.as_deref(),
                Some("app_uninstalled") | Some("tokens_revoked")
            )
    }

    /// The `event.text` field, used by message-subkind matching. Only
    /// meaningful for `Event` envelopes carrying a message-shaped event.
    #[must_use]
    pub fn event_text(&self) -> Option<&str> {
        self.body.get("event")?.get("text")?.as_str()
    }

    /// `action_id` / `block_id` / `callback_id` for interactive payloads,
    /// collected across all entries in an `actions` array (§4.G).
    #[must_use]
    pub fn action_identifiers(&self) -> Vec<ActionIdentifiers> {
        let mut out = Vec::new();
        let block_id = self.body.get("block_id").and_then(Value::as_str);
        let callback_id = self.body.get("callback_id").and_then(Value::as_str);

        if let Some(actions) = self.body.get("actions").and_then(Value::as_array) {
            for action in actions {
                out.push(ActionIdentifiers {
                    action_id: action
                        .get("action_id")
                        .and_then(Value::as_str)
                        .map(String::from),
                    block_id: action
                        .get("block_id")
                        .and_then(Value::as_str)
                        .or(block_id)
                        .map(String::from),
                    callback_id: callback_id.map(String::from),
                });
            }
        }

        if out.is_empty() {
            // Legacy payloads (interactive_message, options) carry a single
            // top-level action_id/name rather than an actions array.
            let action_id = self
                .body
                .get("action_id")
                .and_then(Value::as_str)
                .or_else(|| self.body.get("name").and_then(Value::as_str))
                .map(String::from);
            if action_id.is_some() || block_id.is_some() || callback_id.is_some() {
                out.push(ActionIdentifiers {
                    action_id,
                    block_id: block_id.map(String::from),
                    callback_id: callback_id.map(String::from),
                });
            }
        }
        out
    }

    /// `command` field plus the trailing free-text argument (§4.G commands).
    #[must_use]
    pub fn command(&self) -> Option<(&str, &str)> {
        let command = self.body.get("command")?.as_str()?;
        let text = self.body.get("text").and_then(Value::as_str).unwrap_or("");
        Some((command, text))
    }
}

/// The three identifiers a single interactive action carries, used for
/// constraint matching by the Router (§4.G).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionIdentifiers {
    /// `action_id` of the action (or legacy `name`).
    pub action_id: Option<String>,
    /// `block_id` of the action (if block-kit based).
    pub block_id: Option<String>,
    /// `callback_id` carried by the envelope as a whole.
    pub callback_id: Option<String>,
}
