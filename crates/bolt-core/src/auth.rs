// SPDX-License-Identifier: MIT OR Apache-2.0
//! The authorization result produced per envelope (§3, §4.C).

/// Bot/user token material and team context resolved for one envelope.
///
/// Produced by the Authorize Resolver. `app_uninstalled` and
/// `tokens_revoked` events bypass resolution entirely and receive
/// [`AuthorizationResult::empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// Bot token to use for outbound API calls, if one was resolved.
    pub bot_token: Option<String>,
    /// User token, if the installation includes one.
    pub user_token: Option<String>,
    /// Bot's user-independent identifier.
    pub bot_id: Option<String>,
    /// Bot's user identifier (used by `ignore_self` / `direct_mention`).
    pub bot_user_id: Option<String>,
    /// Team the installation belongs to.
    pub team_id: Option<String>,
    /// Enterprise grid the installation belongs to, if any.
    pub enterprise_id: Option<String>,
}

impl AuthorizationResult {
    /// The empty result used for envelopes that skip resolution.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// `true` when a bot token was resolved, meaning the Context Builder
    /// should bind a token-scoped client rather than the global client.
    #[must_use]
    pub fn has_bot_token(&self) -> bool {
        self.bot_token.is_some()
    }
}
