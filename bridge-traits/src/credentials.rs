//! Credential source contract.
//!
//! The sync worker receives already-issued tokens; it never runs an OAuth
//! handshake. It only asks for the linked tokens of a user when a session
//! starts and for a fresh playback access token when the current one expires.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Tokens linked to one user.
///
/// Either side may be missing; callers decide which sides they need.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LinkedTokens {
    /// Messaging-service user token (status read/write scope).
    pub messaging_token: Option<String>,
    /// Playback-service access token.
    pub playback_access_token: Option<String>,
    /// Playback-service refresh token.
    pub playback_refresh_token: Option<String>,
}

impl LinkedTokens {
    pub fn has_messaging(&self) -> bool {
        self.messaging_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_playback(&self) -> bool {
        self.playback_access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for LinkedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("LinkedTokens")
            .field("messaging_token", &mask(&self.messaging_token))
            .field("playback_access_token", &mask(&self.playback_access_token))
            .field("playback_refresh_token", &mask(&self.playback_refresh_token))
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No accounts linked for user {0}")]
    NotLinked(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),
}

/// Supplies and refreshes the tokens of a user.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current tokens for `user_id`, or [`CredentialError::NotLinked`].
    async fn get_tokens(&self, user_id: &str) -> Result<LinkedTokens, CredentialError>;

    /// Exchange `refresh_token` for a new playback access token.
    ///
    /// Implementations persist the new token before returning it.
    async fn refresh(&self, user_id: &str, refresh_token: &str)
        -> Result<String, CredentialError>;
}
