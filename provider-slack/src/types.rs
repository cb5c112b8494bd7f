//! Slack Web API request and response types

use serde::{Deserialize, Serialize};

/// Envelope shared by every Web API response
///
/// See: https://api.slack.com/web#evaluating_responses
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `users.profile.get` response
#[derive(Debug, Deserialize)]
pub struct ProfileGetResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub status_emoji: String,
}

/// `users.profile.set` request body
#[derive(Debug, Serialize)]
pub struct ProfileSetRequest<'a> {
    pub profile: StatusProfile<'a>,
}

/// Status fields of a profile update
#[derive(Debug, Serialize)]
pub struct StatusProfile<'a> {
    pub status_text: &'a str,
    pub status_emoji: &'a str,
    /// `0` means the status never expires
    pub status_expiration: i64,
}
