//! Status publisher contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A messaging-service status: free text plus an icon shortcode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagingStatus {
    pub text: String,
    pub icon: String,
}

impl MessagingStatus {
    pub fn new(text: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            icon: icon.into(),
        }
    }

    /// An empty status, used when the original could not be read.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Rate limited by messaging service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Messaging token expired or revoked")]
    AuthExpired,

    #[error("Status call failed: {0}")]
    Failed(String),
}

/// Reads and writes the status of the user owning `access_token`.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn get_status(&self, access_token: &str) -> Result<MessagingStatus, PublishError>;

    async fn set_status(
        &self,
        access_token: &str,
        status: &MessagingStatus,
    ) -> Result<(), PublishError>;
}
