//! Slack Web API connector implementation
//!
//! Implements the `StatusPublisher` trait on top of the `users.profile.*`
//! methods.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::status::{MessagingStatus, PublishError, StatusPublisher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SlackError};
use crate::types::{ApiEnvelope, ProfileGetResponse, ProfileSetRequest, StatusProfile};

/// Slack Web API base URL
const SLACK_API_BASE: &str = "https://slack.com/api";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack Web API connector
///
/// Requires a user token with `users.profile:read` and
/// `users.profile:write`. The token is passed per call.
///
/// # Example
///
/// ```ignore
/// use provider_slack::SlackConnector;
/// use bridge_traits::status::{MessagingStatus, StatusPublisher};
///
/// let connector = SlackConnector::new(http_client);
/// let original = connector.get_status(&token).await?;
/// connector
///     .set_status(&token, &MessagingStatus::new("In a meeting", ":calendar:"))
///     .await?;
/// ```
pub struct SlackConnector {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    request_timeout: Duration,
}

impl SlackConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: SLACK_API_BASE.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<MessagingStatus> {
        let request = HttpRequest::get(self.method_url("users.profile.get"))
            .bearer_token(access_token)
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;
        Self::check_http(&response)?;

        let body: ProfileGetResponse = response
            .json()
            .map_err(|e| SlackError::ParseError(e.to_string()))?;
        if !body.ok {
            return Err(SlackError::from_code(body.error.as_deref().unwrap_or("unknown_error")));
        }

        let profile = body.profile.unwrap_or_default();
        Ok(MessagingStatus::new(profile.status_text, profile.status_emoji))
    }

    async fn update_profile(&self, access_token: &str, status: &MessagingStatus) -> Result<()> {
        let payload = ProfileSetRequest {
            profile: StatusProfile {
                status_text: &status.text,
                status_emoji: &status.icon,
                status_expiration: 0,
            },
        };

        let request = HttpRequest::post(self.method_url("users.profile.set"))
            .bearer_token(access_token)
            .json(&payload)?
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;
        Self::check_http(&response)?;

        let envelope: ApiEnvelope = response
            .json()
            .map_err(|e| SlackError::ParseError(e.to_string()))?;
        if !envelope.ok {
            return Err(SlackError::from_code(
                envelope.error.as_deref().unwrap_or("unknown_error"),
            ));
        }
        Ok(())
    }

    /// Slack reports most failures inside a 200 envelope; this only handles
    /// the transport-level ones.
    fn check_http(response: &HttpResponse) -> Result<()> {
        match response.status {
            429 => Err(SlackError::RateLimited {
                retry_after: response.retry_after(),
            }),
            401 | 403 => Err(SlackError::Unauthorized(format!("HTTP {}", response.status))),
            status if !response.is_success() => Err(SlackError::HttpError {
                status_code: status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StatusPublisher for SlackConnector {
    #[instrument(skip_all)]
    async fn get_status(&self, access_token: &str) -> std::result::Result<MessagingStatus, PublishError> {
        match self.fetch_profile(access_token).await {
            Ok(status) => {
                debug!(text = %status.text, icon = %status.icon, "Read profile status");
                Ok(status)
            }
            Err(e) => {
                warn!(error = %e, "users.profile.get failed");
                Err(e.into())
            }
        }
    }

    #[instrument(skip_all, fields(text = %status.text))]
    async fn set_status(
        &self,
        access_token: &str,
        status: &MessagingStatus,
    ) -> std::result::Result<(), PublishError> {
        match self.update_profile(access_token, status).await {
            Ok(()) => {
                debug!("Profile status updated");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "users.profile.set failed");
                Err(e.into())
            }
        }
    }
}
