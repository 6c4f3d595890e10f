// SPDX-License-Identifier: MIT OR Apache-2.0
//! Listener constraints — the match predicate half of a registration (§3, §4.G).
//!
//! [`crate::Constraint`] carries only data; `bolt-runtime::router` pairs a
//! constraint with a handler and chain-local middleware to form a full
//! listener registration.

use crate::envelope::{Envelope, EnvelopeKind};
use regex::Regex;

/// Either a literal string or a first-match regex.
///
/// Unknown constraint fields are equivalent to "any" (§3) — represented by
/// simply omitting a [`StringMatch`] from a [`Constraint`] (`None`).
#[derive(Debug, Clone)]
pub enum StringMatch {
    /// Exact, case-sensitive string equality.
    Literal(String),
    /// First-match regex search (not full-match) against the candidate text.
    Regex(Regex),
}

impl StringMatch {
    /// Build a literal matcher.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Build a regex matcher, compiling `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Test `candidate` against this matcher.
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Literal(s) => s == candidate,
            Self::Regex(r) => r.is_match(candidate),
        }
    }
}

/// The `type` discriminant for view envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewConstraintKind {
    /// `view_submission`.
    Submission,
    /// `view_closed`.
    Closed,
}

/// The `type` discriminant for shortcut envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutConstraintKind {
    /// Global shortcut (`type == "shortcut"`).
    Global,
    /// Message shortcut (`type == "message_action"`).
    Message,
}

/// The conjunction of zero or more match predicates a listener registers
/// against. Every `Some` field must match for the constraint to hold;
/// `None` fields are treated as "any" (§3).
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    /// `event.type` for event envelopes.
    pub event_type: Option<StringMatch>,
    /// `event.text` for message sub-kind events.
    pub message_text: Option<StringMatch>,
    /// Literal or regex match on the slash command name.
    pub command: Option<StringMatch>,
    /// `action_id` match (actions, options).
    pub action_id: Option<StringMatch>,
    /// `block_id` match (actions, options).
    pub block_id: Option<StringMatch>,
    /// `callback_id` match (actions, shortcuts, views).
    pub callback_id: Option<StringMatch>,
    /// View lifecycle discriminant.
    pub view_kind: Option<ViewConstraintKind>,
    /// Shortcut discriminant (global vs. message).
    pub shortcut_kind: Option<ShortcutConstraintKind>,
}

impl Constraint {
    /// An empty constraint — matches any envelope of the listener's kind.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Evaluate this constraint's conjunction against `envelope`.
    #[must_use]
    pub fn matches(&self, kind: EnvelopeKind, envelope: &Envelope) -> bool {
        match kind {
            EnvelopeKind::Event | EnvelopeKind::AssistantEvent => self.matches_event(envelope),
            EnvelopeKind::Action => self.matches_action(envelope),
            EnvelopeKind::Command => self.matches_command(envelope),
            EnvelopeKind::Shortcut => self.matches_shortcut(envelope),
            EnvelopeKind::View => self.matches_view(envelope),
            EnvelopeKind::Options => self.matches_options(envelope),
        }
    }

    fn matches_event(&self, envelope: &Envelope) -> bool {
        if let Some(m) = &self.event_type {
            match envelope.routing.event_type.as_deref() {
                Some(t) if m.is_match(t) => {}
                _ => return false,
            }
        }
        if let Some(m) = &self.message_text {
            match envelope.event_text() {
                Some(t) if m.is_match(t) => {}
                _ => return false,
            }
        }
        true
    }

    fn matches_action(&self, envelope: &Envelope) -> bool {
        self.matching_action(envelope).is_some()
    }

    /// The first action in the envelope's `actions` array (or legacy single
    /// action) satisfying this constraint, if any. Exposed so the Router
    /// can recover *which* action matched — a listener matching several
    /// entries in the array is still invoked exactly once, with the first
    /// matching entry as its args (§9 Open Question (a)).
    #[must_use]
    pub fn matching_action(&self, envelope: &Envelope) -> Option<crate::envelope::ActionIdentifiers> {
        envelope
            .action_identifiers()
            .into_iter()
            .find(|ids| self.action_triplet_matches(ids))
    }

    fn action_triplet_matches(&self, ids: &crate::envelope::ActionIdentifiers) -> bool {
        if let Some(m) = &self.action_id {
            match ids.action_id.as_deref() {
                Some(a) if m.is_match(a) => {}
                _ => return false,
            }
        }
        if let Some(m) = &self.block_id {
            match ids.block_id.as_deref() {
                Some(b) if m.is_match(b) => {}
                _ => return false,
            }
        }
        if let Some(m) = &self.callback_id {
            match ids.callback_id.as_deref() {
                Some(c) if m.is_match(c) => {}
                _ => return false,
            }
        }
        true
    }

    fn matches_command(&self, envelope: &Envelope) -> bool {
        let Some((command, _text)) = envelope.command() else {
            return false;
        };
        match &self.command {
            Some(m) => m.is_match(command),
            None => true,
        }
    }

    fn matches_shortcut(&self, envelope: &Envelope) -> bool {
        if let Some(kind) = self.shortcut_kind {
            let type_str = envelope.body.get("type").and_then(serde_json::Value::as_str);
            let is_message = type_str == Some("message_action");
            let wants_message = matches!(kind, ShortcutConstraintKind::Message);
            if is_message != wants_message {
                return false;
            }
        }
        if let Some(m) = &self.callback_id {
            match envelope.body.get("callback_id").and_then(serde_json::Value::as_str) {
                Some(c) if m.is_match(c) => {}
                _ => return false,
            }
        }
        true
    }

    fn matches_view(&self, envelope: &Envelope) -> bool {
        if let Some(kind) = self.view_kind {
            let type_str = envelope.body.get("type").and_then(serde_json::Value::as_str);
            let wants = match kind {
                ViewConstraintKind::Submission => "view_submission",
                ViewConstraintKind::Closed => "view_closed",
            };
            if type_str != Some(wants) {
                return false;
            }
        }
        if let Some(m) = &self.callback_id {
            let view_callback = envelope
                .body
                .get("view")
                .and_then(|v| v.get("callback_id"))
                .and_then(serde_json::Value::as_str);
            match view_callback {
                Some(c) if m.is_match(c) => {}
                _ => return false,
            }
        }
        true
    }

    fn matches_options(&self, envelope: &Envelope) -> bool {
        self.matching_action(envelope).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RoutingKeys;
    use serde_json::json;

    fn event_envelope(event_type: &str, text: &str) -> Envelope {
        Envelope {
            kind: EnvelopeKind::Event,
            raw_body: Vec::new(),
            body: json!({ "event": { "type": event_type, "text": text } }),
            routing: RoutingKeys {
                event_type: Some(event_type.to_string()),
                ..Default::default()
            },
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        }
    }

    #[test]
    fn any_constraint_matches_everything() {
        let c = Constraint::any();
        assert!(c.matches(EnvelopeKind::Event, &event_envelope("app_mention", "hi")));
    }

    #[test]
    fn event_type_constraint_filters() {
        let c = Constraint {
            event_type: Some(StringMatch::literal("app_mention")),
            ..Constraint::any()
        };
        assert!(c.matches(EnvelopeKind::Event, &event_envelope("app_mention", "hi")));
        assert!(!c.matches(EnvelopeKind::Event, &event_envelope("message", "hi")));
    }

    #[test]
    fn regex_message_match_is_case_insensitive_when_pattern_says_so() {
        let c = Constraint {
            message_text: Some(StringMatch::regex("(?i)hello").unwrap()),
            ..Constraint::any()
        };
        assert!(c.matches(EnvelopeKind::Event, &event_envelope("message", "Hello there!")));
        assert!(!c.matches(EnvelopeKind::Event, &event_envelope("message", "Good morning!")));
    }

    #[test]
    fn action_array_with_multiple_actions_matches_any_one() {
        let envelope = Envelope {
            kind: EnvelopeKind::Action,
            raw_body: Vec::new(),
            body: json!({
                "actions": [
                    { "action_id": "a1" },
                    { "action_id": "a2" }
                ]
            }),
            routing: RoutingKeys::default(),
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        };
        let c = Constraint {
            action_id: Some(StringMatch::literal("a2")),
            ..Constraint::any()
        };
        assert!(c.matches(EnvelopeKind::Action, &envelope));
    }

    #[test]
    fn legacy_interactive_message_name_normalizes_to_action_id() {
        let envelope = Envelope {
            kind: EnvelopeKind::Options,
            raw_body: Vec::new(),
            body: json!({ "type": "interactive_message", "name": "legacy_select" }),
            routing: RoutingKeys::default(),
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        };
        let c = Constraint {
            action_id: Some(StringMatch::literal("legacy_select")),
            ..Constraint::any()
        };
        assert!(c.matches(EnvelopeKind::Options, &envelope));
    }
}
