use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_auth::AuthError;
use core_sync::SyncError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// HTTP status reported for this error by the control surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Auth(AuthError::InvalidUserId(_))
            | CoreError::Auth(AuthError::InvalidToken(_))
            | CoreError::Sync(SyncError::CredentialsMissing { .. })
            | CoreError::Sync(SyncError::SourceUnavailable(_)) => StatusCode::BAD_REQUEST,
            CoreError::Auth(AuthError::NotLinked { .. })
            | CoreError::Sync(SyncError::SessionNotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let message = match &self {
            CoreError::Sync(e) => e.to_string(),
            CoreError::Auth(e) => e.to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
