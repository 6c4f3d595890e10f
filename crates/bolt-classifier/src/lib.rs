// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-classifier
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Maps a raw inbound body (JSON or form-encoded) to a single typed
//! [`Envelope`] shape and extracts its routing keys (§4.A).

use bolt_core::envelope::{Envelope, EnvelopeKind, RoutingKeys};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Result of classifying one inbound request body.
#[derive(Debug)]
pub enum ClassifyOutcome {
    /// A fully classified envelope, ready for authorization + dispatch.
    Envelope(Envelope),
    /// A platform connectivity probe — Ack with no body, never dispatched.
    SslCheck,
    /// A URL-verification handshake — Ack with `challenge` echoed back.
    UrlVerification {
        /// The `challenge` string to echo in the response body.
        challenge: Option<String>,
    },
    /// The body did not match any known shape. Callers should short-circuit
    /// to a 400-equivalent response and never enter the pipeline (§4.A).
    Unclassified,
}

/// Classify `raw_body` using `content_type` to decide JSON vs. form parsing.
///
/// `retry_num` / `retry_reason` / `is_enterprise_install` travel on HTTP
/// headers on most receivers, not the body, so callers that have them
/// available should set them on the returned [`Envelope`] before the
/// envelope enters the pipeline — see the note on [`Envelope`].
#[must_use]
pub fn classify(raw_body: &[u8], content_type: Option<&str>) -> ClassifyOutcome {
    let is_form = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let doc = if is_form {
        match parse_form(raw_body) {
            Some(doc) => doc,
            None => {
                debug!(target: "bolt.classifier", "form body failed to parse");
                return ClassifyOutcome::Unclassified;
            }
        }
    } else {
        match serde_json::from_slice::<Value>(raw_body) {
            Ok(doc) => doc,
            Err(err) => {
                debug!(target: "bolt.classifier", %err, "body is not valid JSON");
                return ClassifyOutcome::Unclassified;
            }
        }
    };

    match classify_kind(&doc) {
        Kind::SslCheck => ClassifyOutcome::SslCheck,
        Kind::UrlVerification => ClassifyOutcome::UrlVerification {
            challenge: str_field(&doc, "challenge").map(String::from),
        },
        Kind::Unclassified => ClassifyOutcome::Unclassified,
        Kind::Classified(kind) => ClassifyOutcome::Envelope(Envelope {
            kind,
            raw_body: raw_body.to_vec(),
            routing: extract_routing(&doc),
            is_enterprise_install: doc
                .get("is_enterprise_install")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            function_execution_id: str_field(&doc, "function_execution_id").map(String::from),
            app_installed_team_id: str_field(&doc, "app_installed_team_id").map(String::from),
            retry_num: None,
            retry_reason: None,
            body: doc,
        }),
    }
}

/// Parse an `application/x-www-form-urlencoded` body.
///
/// A `payload` field holds a JSON-encoded interactive callback; otherwise
/// the form itself is a slash-command envelope and is reconstructed as a
/// JSON object of string fields (§4.A step 1).
fn parse_form(raw_body: &[u8]) -> Option<Value> {
    let fields: BTreeMap<String, String> = serde_urlencoded::from_bytes(raw_body).ok()?;
    if let Some(payload) = fields.get("payload") {
        return serde_json::from_str(payload).ok();
    }
    let object = fields
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Some(Value::Object(object))
}

enum Kind {
    SslCheck,
    UrlVerification,
    Unclassified,
    Classified(EnvelopeKind),
}

fn classify_kind(doc: &Value) -> Kind {
    let type_str = str_field(doc, "type");

    if doc.get("ssl_check").is_some() {
        return Kind::SslCheck;
    }
    if type_str == Some("url_verification") {
        return Kind::UrlVerification;
    }
    if type_str == Some("event_callback") || doc.get("event_callback").is_some() {
        return Kind::Classified(EnvelopeKind::Event);
    }
    if doc.get("command").is_some() {
        return Kind::Classified(EnvelopeKind::Command);
    }
    match type_str {
        // message_action overlaps the interactive-action type set but is
        // routed as a shortcut, matching the platform's own semantics.
        Some("message_action") => return Kind::Classified(EnvelopeKind::Shortcut),
        // A legacy `interactive_message` carrying a top-level `name` is a
        // menu selection (legacy options), not a button/action click —
        // normalized to the same option-kind constraint as block_suggestion.
        Some("interactive_message") if doc.get("name").and_then(Value::as_str).is_some() => {
            return Kind::Classified(EnvelopeKind::Options);
        }
        Some("block_actions") | Some("interactive_message") | Some("attachment_action") => {
            return Kind::Classified(EnvelopeKind::Action);
        }
        Some("shortcut") => return Kind::Classified(EnvelopeKind::Shortcut),
        Some("view_submission") | Some("view_closed") => {
            return Kind::Classified(EnvelopeKind::View);
        }
        Some("block_suggestion") | Some("dialog_suggestion") => {
            return Kind::Classified(EnvelopeKind::Options);
        }
        _ => {}
    }
    Kind::Unclassified
}

fn str_field<'v>(doc: &'v Value, key: &str) -> Option<&'v str> {
    doc.get(key)?.as_str()
}

fn nested_str<'v>(doc: &'v Value, parent: &str, key: &str) -> Option<&'v str> {
    doc.get(parent)?.get(key)?.as_str()
}

fn extract_routing(doc: &Value) -> RoutingKeys {
    RoutingKeys {
        team_id: str_field(doc, "team_id")
            .or_else(|| nested_str(doc, "team", "id"))
            .map(String::from),
        enterprise_id: str_field(doc, "enterprise_id")
            .or_else(|| nested_str(doc, "enterprise", "id"))
            .map(String::from),
        user_id: str_field(doc, "user_id")
            .or_else(|| nested_str(doc, "user", "id"))
            .or_else(|| nested_str(doc, "event", "user"))
            .map(String::from),
        conversation_id: nested_str(doc, "event", "channel")
            .or_else(|| nested_str(doc, "channel", "id"))
            .or_else(|| str_field(doc, "channel_id"))
            .map(String::from),
        event_type: nested_str(doc, "event", "type").map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ssl_check_is_recognized() {
        let body = json!({ "ssl_check": "1" }).to_string();
        assert!(matches!(classify(body.as_bytes(), None), ClassifyOutcome::SslCheck));
    }

    #[test]
    fn url_verification_echoes_challenge() {
        let body = json!({ "type": "url_verification", "challenge": "abc123" }).to_string();
        match classify(body.as_bytes(), None) {
            ClassifyOutcome::UrlVerification { challenge } => {
                assert_eq!(challenge.as_deref(), Some("abc123"));
            }
            other => panic!("expected url_verification, got {other:?}"),
        }
    }

    #[test]
    fn event_callback_classifies_as_event_and_extracts_routing() {
        let body = json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": { "type": "app_mention", "user": "U1", "channel": "C1", "text": "hi" }
        })
        .to_string();
        match classify(body.as_bytes(), None) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Event);
                assert_eq!(envelope.routing.team_id.as_deref(), Some("T1"));
                assert_eq!(envelope.routing.user_id.as_deref(), Some("U1"));
                assert_eq!(envelope.routing.conversation_id.as_deref(), Some("C1"));
                assert_eq!(envelope.routing.event_type.as_deref(), Some("app_mention"));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn message_action_is_classified_as_shortcut_not_action() {
        let body = json!({ "type": "message_action", "callback_id": "cb1" }).to_string();
        match classify(body.as_bytes(), None) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Shortcut);
            }
            other => panic!("expected shortcut, got {other:?}"),
        }
    }

    #[test]
    fn slash_command_form_body_without_payload_field() {
        let body = "command=%2Fweather&text=seattle&team_id=T9";
        match classify(body.as_bytes(), Some("application/x-www-form-urlencoded")) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Command);
                assert_eq!(envelope.command(), Some(("/weather", "seattle")));
                assert_eq!(envelope.routing.team_id.as_deref(), Some("T9"));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn form_payload_field_is_parsed_as_interactive_json() {
        let inner = json!({ "type": "block_actions", "actions": [{ "action_id": "a1" }] }).to_string();
        let body = format!("payload={}", urlencode(&inner));
        match classify(body.as_bytes(), Some("application/x-www-form-urlencoded")) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Action);
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn legacy_interactive_message_with_name_is_classified_as_options() {
        let body = json!({
            "type": "interactive_message",
            "name": "menu_field",
            "value": "opt1",
            "callback_id": "cb1"
        })
        .to_string();
        match classify(body.as_bytes(), None) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Options);
            }
            other => panic!("expected options, got {other:?}"),
        }
    }

    #[test]
    fn legacy_interactive_message_without_name_is_classified_as_action() {
        let body = json!({ "type": "interactive_message", "callback_id": "cb1" }).to_string();
        match classify(body.as_bytes(), None) {
            ClassifyOutcome::Envelope(envelope) => {
                assert_eq!(envelope.kind, EnvelopeKind::Action);
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_unclassified() {
        assert!(matches!(classify(b"{not json", None), ClassifyOutcome::Unclassified));
    }

    #[test]
    fn unrecognized_shape_is_unclassified() {
        let body = json!({ "hello": "world" }).to_string();
        assert!(matches!(classify(body.as_bytes(), None), ClassifyOutcome::Unclassified));
    }

    fn urlencode(s: &str) -> String {
        s.bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    (b as char).to_string()
                }
                _ => format!("%{b:02X}"),
            })
            .collect()
    }
}
