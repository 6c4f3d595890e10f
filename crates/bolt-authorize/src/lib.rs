// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-authorize
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Resolves a per-envelope [`AuthorizationResult`] from either a static
//! token or a user-supplied resolver (§4.C).

use async_trait::async_trait;
use bolt_core::envelope::Envelope;
use bolt_core::error::{BoltError, BoltErrorCode};
use bolt_core::AuthorizationResult;
use serde_json::Value;

/// Errors a custom [`AuthorizeResolver`] implementation may return.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    /// The resolver could not produce an authorization result.
    #[error("authorize resolver failed: {0}")]
    Failed(String),
}

/// The fields a resolver needs to produce an [`AuthorizationResult`] (§4.C).
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    /// Workspace id, if present on the envelope.
    pub team_id: Option<String>,
    /// Enterprise grid id, if present.
    pub enterprise_id: Option<String>,
    /// Conversation id, if present.
    pub conversation_id: Option<String>,
    /// User id, if present.
    pub user_id: Option<String>,
    /// `true` when the installing entity is an enterprise.
    pub is_enterprise_install: bool,
    /// The envelope's full parsed body, for resolvers that need more than
    /// the extracted routing keys.
    pub envelope_body: Value,
}

/// Produces an [`AuthorizationResult`] for one envelope.
///
/// Implement this directly for "custom resolver mode" (§4.C); use
/// [`StaticTokenResolver`] for "static token mode".
#[async_trait]
pub trait AuthorizeResolver: Send + Sync {
    /// Resolve authorization fields for the given envelope context.
    async fn resolve(&self, params: AuthorizeParams) -> Result<AuthorizationResult, AuthorizeError>;
}

/// Returns a fixed bot token (and optional bot id / bot user id) for every
/// envelope — "static token mode" (§4.C).
#[derive(Debug, Clone)]
pub struct StaticTokenResolver {
    token: String,
    bot_id: Option<String>,
    bot_user_id: Option<String>,
}

impl StaticTokenResolver {
    /// Build a resolver that always returns `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            bot_id: None,
            bot_user_id: None,
        }
    }

    /// Attach a known bot id, returned on every resolution.
    #[must_use]
    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Attach a known bot user id, returned on every resolution.
    #[must_use]
    pub fn with_bot_user_id(mut self, bot_user_id: impl Into<String>) -> Self {
        self.bot_user_id = Some(bot_user_id.into());
        self
    }
}

#[async_trait]
impl AuthorizeResolver for StaticTokenResolver {
    async fn resolve(&self, params: AuthorizeParams) -> Result<AuthorizationResult, AuthorizeError> {
        Ok(AuthorizationResult {
            bot_token: Some(self.token.clone()),
            user_token: None,
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            team_id: params.team_id,
            enterprise_id: params.enterprise_id,
        })
    }
}

/// Run the authorization gate + resolver for one envelope (§4.C).
///
/// `app_uninstalled` and `tokens_revoked` events bypass the resolver
/// entirely, per [`Envelope::skips_authorization`].
///
/// # Errors
///
/// Returns [`BoltError::Authorization`] if the resolver fails.
pub async fn authorize(
    resolver: &dyn AuthorizeResolver,
    envelope: &Envelope,
) -> Result<AuthorizationResult, BoltError> {
    if envelope.skips_authorization() {
        return Ok(AuthorizationResult::empty());
    }

    let params = AuthorizeParams {
        team_id: envelope.routing.team_id.clone(),
        enterprise_id: envelope.routing.enterprise_id.clone(),
        conversation_id: envelope.routing.conversation_id.clone(),
        user_id: envelope.routing.user_id.clone(),
        is_enterprise_install: envelope.is_enterprise_install,
        envelope_body: envelope.body.clone(),
    };

    resolver.resolve(params).await.map_err(|err| BoltError::Authorization {
        code: BoltErrorCode::ResolverFailed,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolt_core::envelope::RoutingKeys;
    use bolt_core::EnvelopeKind;
    use serde_json::json;

    fn event(event_type: &str) -> Envelope {
        Envelope {
            kind: EnvelopeKind::Event,
            raw_body: Vec::new(),
            body: json!({}),
            routing: RoutingKeys {
                event_type: Some(event_type.to_string()),
                team_id: Some("T1".to_string()),
                ..Default::default()
            },
            retry_num: None,
            retry_reason: None,
            is_enterprise_install: false,
            function_execution_id: None,
            app_installed_team_id: None,
        }
    }

    #[tokio::test]
    async fn static_resolver_returns_fixed_token() {
        let resolver = StaticTokenResolver::new("xoxb-static").with_bot_id("B1");
        let result = authorize(&resolver, &event("app_mention")).await.unwrap();
        assert_eq!(result.bot_token.as_deref(), Some("xoxb-static"));
        assert_eq!(result.bot_id.as_deref(), Some("B1"));
        assert_eq!(result.team_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn app_uninstalled_skips_the_resolver_entirely() {
        struct PanicsResolver;
        #[async_trait]
        impl AuthorizeResolver for PanicsResolver {
            async fn resolve(&self, _: AuthorizeParams) -> Result<AuthorizationResult, AuthorizeError> {
                panic!("resolver should not be called for app_uninstalled");
            }
        }
        let result = authorize(&PanicsResolver, &event("app_uninstalled")).await.unwrap();
        assert_eq!(result, AuthorizationResult::empty());
    }

    #[tokio::test]
    async fn resolver_failure_surfaces_as_authorization_error() {
        struct FailingResolver;
        #[async_trait]
        impl AuthorizeResolver for FailingResolver {
            async fn resolve(&self, _: AuthorizeParams) -> Result<AuthorizationResult, AuthorizeError> {
                Err(AuthorizeError::Failed("installation not found".into()))
            }
        }
        let err = authorize(&FailingResolver, &event("app_mention")).await.unwrap_err();
        assert_eq!(err.error_code(), BoltErrorCode::ResolverFailed);
    }
}
