//! Error types for the Slack provider

use bridge_traits::status::PublishError;
use std::time::Duration;
use thiserror::Error;

/// Slack provider errors
#[derive(Error, Debug)]
pub enum SlackError {
    /// Token is invalid, expired, revoked or belongs to a deactivated account
    #[error("Slack rejected the token: {0}")]
    Unauthorized(String),

    /// HTTP 429 or `ok: false` with `ratelimited`
    #[error("Rate limited by Slack")]
    RateLimited { retry_after: Option<Duration> },

    /// `ok: false` with any other error code
    #[error("Slack API error: {0}")]
    ApiError(String),

    /// Non-2xx HTTP response without a Slack envelope
    #[error("Slack HTTP error (status {status_code}): {message}")]
    HttpError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for Slack operations
pub type Result<T> = std::result::Result<T, SlackError>;

impl SlackError {
    /// Classify an `error` code from an `ok: false` envelope.
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_auth" | "not_authed" | "token_expired" | "token_revoked"
            | "account_inactive" => SlackError::Unauthorized(code.to_string()),
            "ratelimited" => SlackError::RateLimited { retry_after: None },
            other => SlackError::ApiError(other.to_string()),
        }
    }
}

impl From<SlackError> for PublishError {
    fn from(error: SlackError) -> Self {
        match error {
            SlackError::Unauthorized(_) => PublishError::AuthExpired,
            SlackError::RateLimited { retry_after } => PublishError::RateLimited { retry_after },
            other => PublishError::Failed(other.to_string()),
        }
    }
}
