// SPDX-License-Identifier: MIT OR Apache-2.0
//! Assembles a fresh [`Context`] from a resolved [`AuthorizationResult`]
//! and a classified envelope (§4.D).

use bolt_core::{ApiClient, AssistantContextAccess, AuthorizationResult, BoundClient, Context, Envelope};
use std::sync::Arc;
use tracing::Span;

/// Builds the per-envelope [`Context`].
///
/// Holds the global API client the token-bound and unbound clients are
/// both constructed from (§6's "out of scope" client).
pub struct ContextBuilder {
    global_client: Arc<dyn ApiClient>,
}

impl ContextBuilder {
    /// Build a context builder wrapping the application's global client.
    #[must_use]
    pub fn new(global_client: Arc<dyn ApiClient>) -> Self {
        Self { global_client }
    }

    /// Assemble a [`Context`] for `envelope` given its resolved `auth`.
    ///
    /// When `auth` carries a bot token, `client` is bound to it; otherwise
    /// the context keeps the global client unbound. `function_execution_id`
    /// and `app_installed_team_id` are mirrored into `context.custom` (§4.D).
    #[must_use]
    pub fn build(&self, auth: AuthorizationResult, envelope: &Envelope, logger: Span) -> Context {
        let client = if auth.has_bot_token() {
            BoundClient::new(self.global_client.clone(), auth.bot_token.clone())
        } else {
            BoundClient::new(self.global_client.clone(), None)
        };
        let mut ctx = Context::new(auth, client, logger);

        if let Some(function_execution_id) = &envelope.function_execution_id {
            ctx.custom.insert(
                "function_execution_id".to_string(),
                serde_json::Value::String(function_execution_id.clone()),
            );
            ctx.function_execution_id = Some(function_execution_id.clone());
            if let Some(payload_bot_user_id) = envelope
                .body
                .get("bot_user_id")
                .and_then(serde_json::Value::as_str)
            {
                ctx.auth.bot_user_id = Some(payload_bot_user_id.to_string());
            }
        }

        if let Some(team_id) = &envelope.app_installed_team_id {
            ctx.custom.insert(
                "app_installed_team_id".to_string(),
                serde_json::Value::String(team_id.clone()),
            );
        }

        ctx
    }

    /// As [`Self::build`], additionally attaching assistant thread-context
    /// access (§4.I).
    #[must_use]
    pub fn build_with_assistant(
        &self,
        auth: AuthorizationResult,
        envelope: &Envelope,
        logger: Span,
        assistant: Arc<dyn AssistantContextAccess>,
    ) -> Context {
        self.build(auth, envelope, logger).with_assistant(assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bolt_core::envelope::{EnvelopeKind, RoutingKeys};
    use bolt_core::ClientError;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct RecordingClient;
    #[async_trait]
    impl ApiClient for RecordingClient {
        async fn call(
            &self,
            _m: &str,
            _t: Option<&str>,
            _p: BTreeMap<String, serde_json::Value>,
        ) -> Result<serde_json::Value, ClientError> {
            Ok(json!({}))
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            kind: EnvelopeKind::Event,
            raw_body: Vec::new(),
            body: json!({}),
            routing: RoutingKeys::default(),
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        }
    }

    #[test]
    fn bot_token_binds_the_client() {
        let builder = ContextBuilder::new(Arc::new(RecordingClient));
        let auth = AuthorizationResult {
            bot_token: Some("xoxb-1".to_string()),
            ..AuthorizationResult::empty()
        };
        let ctx = builder.build(auth, &envelope(), Span::none());
        assert_eq!(ctx.client.token(), Some("xoxb-1"));
    }

    #[test]
    fn missing_bot_token_leaves_client_unbound() {
        let builder = ContextBuilder::new(Arc::new(RecordingClient));
        let ctx = builder.build(AuthorizationResult::empty(), &envelope(), Span::none());
        assert_eq!(ctx.client.token(), None);
    }

    #[test]
    fn function_execution_id_is_mirrored_and_overrides_bot_user_id() {
        let builder = ContextBuilder::new(Arc::new(RecordingClient));
        let mut env = envelope();
        env.function_execution_id = Some("Fn123".to_string());
        env.body = json!({ "bot_user_id": "UPAYLOAD" });
        let auth = AuthorizationResult {
            bot_user_id: Some("URESOLVED".to_string()),
            ..AuthorizationResult::empty()
        };
        let ctx = builder.build(auth, &env, Span::none());
        assert_eq!(
            ctx.custom.get("function_execution_id"),
            Some(&json!("Fn123"))
        );
        assert_eq!(ctx.auth.bot_user_id.as_deref(), Some("UPAYLOAD"));
    }

    #[test]
    fn app_installed_team_id_is_mirrored_verbatim() {
        let builder = ContextBuilder::new(Arc::new(RecordingClient));
        let mut env = envelope();
        env.app_installed_team_id = Some("T999".to_string());
        let ctx = builder.build(AuthorizationResult::empty(), &env, Span::none());
        assert_eq!(ctx.custom.get("app_installed_team_id"), Some(&json!("T999")));
    }
}
