//! Error types for the Spotify provider

use bridge_traits::playback::PlaybackError;
use thiserror::Error;

/// Spotify provider errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Access token expired or was revoked (HTTP 401)
    #[error("Spotify rejected the access token")]
    Unauthorized,

    /// Too many requests (HTTP 429)
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// API request returned an error
    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for PlaybackError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Unauthorized => PlaybackError::AuthExpired,
            other => PlaybackError::Transient(other.to_string()),
        }
    }
}
