use bridge_traits::credentials::CredentialError;
use bridge_traits::status::PublishError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Cannot start sync for {user_id}: missing {missing} credentials")]
    CredentialsMissing { user_id: String, missing: String },

    #[error("No playback source registered for origin {0}")]
    SourceUnavailable(String),

    #[error("No sync session for user {user_id}")]
    SessionNotFound { user_id: String },

    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Rate limited by messaging service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Giving up after {attempts} consecutive errors: {message}")]
    PersistentFailure { attempts: u32, message: String },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<PublishError> for SyncError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::RateLimited { retry_after } => SyncError::RateLimited { retry_after },
            PublishError::AuthExpired => {
                SyncError::AuthExpired("messaging token was rejected".to_string())
            }
            PublishError::Failed(message) => SyncError::Transient(message),
        }
    }
}

impl From<CredentialError> for SyncError {
    fn from(err: CredentialError) -> Self {
        SyncError::Credential(err.to_string())
    }
}
