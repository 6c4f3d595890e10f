// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reusable, I/O-free filter middlewares (§4.K).
//!
//! Each of these is a pure predicate over the envelope (and, for
//! `ignore_self`, the bound authorization): it either calls `next` or
//! returns `Ok(())` without doing so, short-circuiting the chain.

use crate::middleware::{FromFn, Middleware, Next};
use bolt_core::listener::StringMatch;
use bolt_core::{Context, Envelope, EnvelopeKind};
use std::sync::Arc;

const MEMBER_JOIN_LEAVE_EVENTS: [&str; 2] = ["member_joined_channel", "member_left_channel"];

fn scope(kind: EnvelopeKind) -> Arc<dyn Middleware> {
    FromFn::new(move |ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let matches = envelope.kind == kind;
        async move {
            if matches {
                next.run(ctx, envelope).await
            } else {
                Ok(())
            }
        }
    })
}

/// Only continue the chain for `Event` envelopes.
#[must_use]
pub fn only_events() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::Event)
}

/// Only continue the chain for `Action` envelopes.
#[must_use]
pub fn only_actions() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::Action)
}

/// Only continue the chain for `Command` envelopes.
#[must_use]
pub fn only_commands() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::Command)
}

/// Only continue the chain for `Shortcut` envelopes.
#[must_use]
pub fn only_shortcuts() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::Shortcut)
}

/// Only continue the chain for `View` envelopes.
#[must_use]
pub fn only_views() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::View)
}

/// Only continue the chain for `Options` envelopes.
#[must_use]
pub fn only_options() -> Arc<dyn Middleware> {
    scope(EnvelopeKind::Options)
}

/// Drop envelopes whose event user is the resolved bot user id, except
/// `member_joined_channel` / `member_left_channel` which always pass
/// through (§4.K).
#[must_use]
pub fn ignore_self() -> Arc<dyn Middleware> {
    FromFn::new(|ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let event_type = envelope.routing.event_type.clone();
        let event_user = envelope
            .body
            .get("event")
            .and_then(|e| e.get("user"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let bot_user_id = ctx.auth.bot_user_id.clone();
        async move {
            let preserved = event_type
                .as_deref()
                .is_some_and(|t| MEMBER_JOIN_LEAVE_EVENTS.contains(&t));
            let is_self = !preserved && bot_user_id.is_some() && event_user == bot_user_id;
            if is_self {
                Ok(())
            } else {
                next.run(ctx, envelope).await
            }
        }
    })
}

/// Require the message text to begin with `<@{bot_user_id}>` (§4.K).
#[must_use]
pub fn direct_mention() -> Arc<dyn Middleware> {
    FromFn::new(|ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let text = envelope.event_text().map(str::to_string);
        let bot_user_id = ctx.auth.bot_user_id.clone();
        async move {
            let mentioned = match (&text, &bot_user_id) {
                (Some(text), Some(bot_user_id)) => text.starts_with(&format!("<@{bot_user_id}>")),
                _ => false,
            };
            if mentioned {
                next.run(ctx, envelope).await
            } else {
                Ok(())
            }
        }
    })
}

/// Require `event.type` to equal `event_type` literally (§4.K).
#[must_use]
pub fn match_event_type(event_type: impl Into<String>) -> Arc<dyn Middleware> {
    let event_type = event_type.into();
    FromFn::new(move |ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let matches = envelope.routing.event_type.as_deref() == Some(event_type.as_str());
        async move {
            if matches {
                next.run(ctx, envelope).await
            } else {
                Ok(())
            }
        }
    })
}

/// Require the slash command name to equal `name` literally (§4.K).
#[must_use]
pub fn match_command_name(name: impl Into<String>) -> Arc<dyn Middleware> {
    let name = name.into();
    FromFn::new(move |ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let matches = envelope.command().is_some_and(|(command, _)| command == name);
        async move {
            if matches {
                next.run(ctx, envelope).await
            } else {
                Ok(())
            }
        }
    })
}

/// Require the message text to match `matcher` (literal or regex) (§4.K).
#[must_use]
pub fn match_message(matcher: StringMatch) -> Arc<dyn Middleware> {
    FromFn::new(move |ctx: &mut Context, envelope: &Envelope, next: Next<'_>| {
        let matches = envelope.event_text().is_some_and(|t| matcher.is_match(t));
        async move {
            if matches {
                next.run(ctx, envelope).await
            } else {
                Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{MiddlewareChain, TerminalFn};
    use bolt_core::envelope::RoutingKeys;
    use bolt_core::{ApiClient, AuthorizationResult, BoundClient};
    use crate::cancel::CancellationToken;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::Span;

    struct RecordingClient;
    #[async_trait]
    impl ApiClient for RecordingClient {
        async fn call(
            &self,
            _m: &str,
            _t: Option<&str>,
            _p: std::collections::BTreeMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, bolt_core::ClientError> {
            Ok(json!({}))
        }
    }

    fn context_with_bot(bot_user_id: Option<&str>) -> Context {
        let mut auth = AuthorizationResult::empty();
        auth.bot_user_id = bot_user_id.map(str::to_string);
        Context::new(auth, BoundClient::new(Arc::new(RecordingClient), None), Span::none())
    }

    fn event(event_type: &str, user: Option<&str>, text: &str) -> Envelope {
        let mut body = json!({ "event": { "type": event_type, "text": text } });
        if let Some(user) = user {
            body["event"]["user"] = json!(user);
        }
        Envelope {
            kind: EnvelopeKind::Event,
            raw_body: Vec::new(),
            body,
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

    async fn ran_next(chain: Arc<dyn Middleware>, mut ctx: Context, envelope: &Envelope) -> bool {
        let hit = Arc::new(AtomicBool::new(false));
        let hit2 = hit.clone();
        let chain = MiddlewareChain::from_layers(vec![chain]);
        let token = CancellationToken::new();
        chain
            .run_with(
                &mut ctx,
                envelope,
                &token,
                TerminalFn::new(move |_, _| {
                    hit2.store(true, Ordering::SeqCst);
                    async { Ok(()) }
                }),
            )
            .await
            .unwrap();
        hit.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn ignore_self_drops_own_bot_events() {
        let ctx = context_with_bot(Some("UBOT"));
        let envelope = event("message", Some("UBOT"), "hi");
        assert!(!ran_next(ignore_self(), ctx, &envelope).await);
    }

    #[tokio::test]
    async fn ignore_self_preserves_member_joined_channel() {
        let ctx = context_with_bot(Some("UBOT"));
        let envelope = event("member_joined_channel", Some("UBOT"), "");
        assert!(ran_next(ignore_self(), ctx, &envelope).await);
    }

    #[tokio::test]
    async fn ignore_self_passes_other_users() {
        let ctx = context_with_bot(Some("UBOT"));
        let envelope = event("message", Some("U123"), "hi");
        assert!(ran_next(ignore_self(), ctx, &envelope).await);
    }

    #[tokio::test]
    async fn direct_mention_requires_leading_mention() {
        let ctx = context_with_bot(Some("UBOT"));
        let mentioned = event("message", Some("U1"), "<@UBOT> hello");
        assert!(ran_next(direct_mention(), ctx, &mentioned).await);

        let ctx = context_with_bot(Some("UBOT"));
        let not_mentioned = event("message", Some("U1"), "hello <@UBOT>");
        assert!(!ran_next(direct_mention(), ctx, &not_mentioned).await);
    }

    #[tokio::test]
    async fn only_events_blocks_other_kinds() {
        let ctx = context_with_bot(None);
        let mut envelope = event("message", Some("U1"), "hi");
        envelope.kind = EnvelopeKind::Command;
        assert!(!ran_next(only_events(), ctx, &envelope).await);
    }

    #[tokio::test]
    async fn match_event_type_filters_literally() {
        let ctx = context_with_bot(None);
        let envelope = event("app_mention", Some("U1"), "hi");
        assert!(ran_next(match_event_type("app_mention"), ctx, &envelope).await);

        let ctx = context_with_bot(None);
        let envelope = event("message", Some("U1"), "hi");
        assert!(!ran_next(match_event_type("app_mention"), ctx, &envelope).await);
    }

    #[tokio::test]
    async fn match_message_supports_regex() {
        let ctx = context_with_bot(None);
        let envelope = event("message", Some("U1"), "deploy staging now");
        let matcher = StringMatch::regex("^deploy").unwrap();
        assert!(ran_next(match_message(matcher), ctx, &envelope).await);
    }
}
