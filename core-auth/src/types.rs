use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

const MAX_USER_ID_LEN: usize = 128;

/// Identifier of a user of the sync service.
///
/// Opaque to the service (in practice the messaging-service user id). It is
/// used as a map key, a storage-key suffix and a URL path segment, so it is
/// trimmed and must be non-empty, at most 128 characters, and free of `/`
/// and whitespace.
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let user: UserId = " U024BE7LH ".parse().unwrap();
/// assert_eq!(user.as_str(), "U024BE7LH");
/// assert!("".parse::<UserId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl AsRef<str>) -> Result<Self, AuthError> {
        let trimmed = id.as_ref().trim();

        if trimmed.is_empty() {
            return Err(AuthError::InvalidUserId("user id is empty".to_string()));
        }
        if trimmed.chars().count() > MAX_USER_ID_LEN {
            return Err(AuthError::InvalidUserId(format!(
                "user id exceeds {} characters",
                MAX_USER_ID_LEN
            )));
        }
        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(AuthError::InvalidUserId(format!(
                "user id contains '/' or whitespace: {:?}",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two services a user can link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkedService {
    /// Team-messaging service whose status is written.
    Messaging,
    /// Music-streaming service whose playback is read.
    Playback,
}

impl LinkedService {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkedService::Messaging => "messaging",
            LinkedService::Playback => "playback",
        }
    }
}

impl fmt::Display for LinkedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messaging-service user token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingLink {
    pub access_token: String,
    pub linked_at: DateTime<Utc>,
}

/// Playback-service OAuth tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackLink {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub linked_at: DateTime<Utc>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Everything a user linked. Persisted as one JSON record per user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccounts {
    #[serde(default)]
    pub messaging: Option<MessagingLink>,
    #[serde(default)]
    pub playback: Option<PlaybackLink>,
}

impl LinkedAccounts {
    pub fn is_empty(&self) -> bool {
        self.messaging.is_none() && self.playback.is_none()
    }

    pub fn has(&self, service: LinkedService) -> bool {
        match service {
            LinkedService::Messaging => self.messaging.is_some(),
            LinkedService::Playback => self.playback.is_some(),
        }
    }

    /// Flatten into the shape consumed by sync workers.
    pub fn to_tokens(&self) -> bridge_traits::LinkedTokens {
        bridge_traits::LinkedTokens {
            messaging_token: self.messaging.as_ref().map(|m| m.access_token.clone()),
            playback_access_token: self.playback.as_ref().map(|p| p.access_token.clone()),
            playback_refresh_token: self
                .playback
                .as_ref()
                .and_then(|p| p.refresh_token.clone()),
        }
    }
}

// Tokens never reach Debug output.
impl fmt::Debug for MessagingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingLink")
            .field("access_token", &"[REDACTED]")
            .field("linked_at", &self.linked_at)
            .finish()
    }
}

impl fmt::Debug for PlaybackLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackLink")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("linked_at", &self.linked_at)
            .field("refreshed_at", &self.refreshed_at)
            .finish()
    }
}

impl fmt::Debug for LinkedAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedAccounts")
            .field("messaging", &self.messaging)
            .field("playback", &self.playback)
            .finish()
    }
}
