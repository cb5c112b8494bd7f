use bridge_traits::CredentialError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("No {service} account linked for user {user_id}")]
    NotLinked { user_id: String, service: String },

    #[error("Stored accounts for user {user_id} are corrupted: {reason}")]
    AccountCorrupted { user_id: String, reason: String },

    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Token refresh is not configured")]
    RefreshUnavailable,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<AuthError> for CredentialError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotLinked { user_id, .. } => CredentialError::NotLinked(user_id),
            AuthError::InvalidUserId(id) => CredentialError::NotLinked(id),
            AuthError::TokenRefreshFailed(reason) => CredentialError::RefreshFailed(reason),
            AuthError::RefreshUnavailable => {
                CredentialError::RefreshFailed("token refresh is not configured".to_string())
            }
            other => CredentialError::Unavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
