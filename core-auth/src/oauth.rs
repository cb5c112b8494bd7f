//! Refresh-token grant
//!
//! Exchanges a stored refresh token for a new playback access token. Only
//! the refresh half of OAuth 2.0 lives here; the initial authorization code
//! exchange is handled by whoever links the account.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_runtime::config::OAuthClientSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

const MAX_ATTEMPTS: u32 = 3;

/// Result of a successful refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"[REDACTED]")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges refresh tokens for access tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// [`TokenRefresher`] speaking the standard `grant_type=refresh_token` form
/// POST, with client credentials in the body.
pub struct OAuthRefresher {
    settings: OAuthClientSettings,
    http_client: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl OAuthRefresher {
    pub fn new(
        settings: OAuthClientSettings,
        http_client: Arc<dyn HttpClient>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            http_client,
            request_timeout,
        }
    }

    fn build_request(&self, refresh_token: &str) -> Result<HttpRequest> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        Ok(HttpRequest::post(self.settings.token_url.clone())
            .form(&params)
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?
            .timeout(self.request_timeout))
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    /// 4xx answers fail immediately (the grant itself was rejected). Server
    /// errors, 429 and transport failures are retried with exponential backoff.
    #[instrument(skip(self, refresh_token))]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, "Refreshing access token");

            let request = self.build_request(refresh_token)?;
            let last_error = match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    let body: TokenResponse = response.json().map_err(|e| {
                        AuthError::TokenRefreshFailed(format!(
                            "Failed to parse token response: {}",
                            e
                        ))
                    })?;

                    info!(
                        expires_in = body.expires_in,
                        rotated = body.refresh_token.is_some(),
                        "Refreshed access token"
                    );

                    return Ok(RefreshedToken {
                        access_token: body.access_token,
                        refresh_token: body.refresh_token,
                        expires_in: body.expires_in,
                    });
                }
                Ok(response) if response.is_client_error() && response.status != 429 => {
                    let reason = response
                        .json::<TokenErrorResponse>()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|_| format!("HTTP {}", response.status));

                    warn!(
                        status = response.status,
                        reason = %reason,
                        "Token refresh rejected"
                    );

                    return Err(AuthError::TokenRefreshFailed(format!(
                        "Token endpoint returned {}: {}",
                        response.status, reason
                    )));
                }
                Ok(response) => format!("HTTP {}", response.status),
                Err(e) => e.to_string(),
            };

            if attempts >= MAX_ATTEMPTS {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {}",
                    attempts, last_error
                )));
            }

            let delay = Duration::from_millis(200 * 2u64.pow(attempts - 1));
            warn!(
                attempts,
                error = %last_error,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl std::fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{} ({})", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpResponse, RetryPolicy};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> BridgeResult<HttpResponse>;
        }
    }

    fn settings() -> OAuthClientSettings {
        OAuthClientSettings {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            token_url: "https://accounts.example.com/api/token".to_string(),
        }
    }

    fn refresher(http: MockHttpClient) -> OAuthRefresher {
        OAuthRefresher::new(settings(), Arc::new(http), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_successful_refresh_sends_form_grant() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body = String::from_utf8(request.body.clone().unwrap().to_vec()).unwrap();
                request.url == "https://accounts.example.com/api/token"
                    && body.contains("grant_type=refresh_token")
                    && body.contains("refresh_token=AQD-refresh")
                    && body.contains("client_id=client-id")
                    && request.timeout == Some(Duration::from_secs(5))
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"BQD-new","token_type":"Bearer","expires_in":3600}"#,
                ))
            });

        let token = refresher(http)
            .refresh_access_token("AQD-refresh")
            .await
            .unwrap();

        assert_eq!(token.access_token, "BQD-new");
        assert_eq!(token.refresh_token, None);
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_returned() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"access_token":"BQD-new","refresh_token":"AQD-rotated"}"#,
            ))
        });

        let token = refresher(http).refresh_access_token("AQD-old").await.unwrap();

        assert_eq!(token.refresh_token.as_deref(), Some("AQD-rotated"));
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn test_invalid_grant_is_not_retried() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                400,
                r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            ))
        });

        let err = refresher(http)
            .refresh_access_token("AQD-revoked")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("invalid_grant"));
        assert!(message.contains("Refresh token revoked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_then_fail() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(3)
            .returning(|_| Ok(HttpResponse::new(503, "")));

        let err = refresher(http)
            .refresh_access_token("AQD-refresh")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_then_success() {
        let mut http = MockHttpClient::new();
        let mut calls = 0;
        http.expect_execute().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(BridgeError::Timeout("token endpoint".to_string()))
            } else {
                Ok(HttpResponse::new(200, r#"{"access_token":"BQD-new"}"#))
            }
        });

        let token = refresher(http)
            .refresh_access_token("AQD-refresh")
            .await
            .unwrap();
        assert_eq!(token.access_token, "BQD-new");
    }

    #[test]
    fn test_refreshed_token_debug_is_redacted() {
        let token = RefreshedToken {
            access_token: "BQD-secret".to_string(),
            refresh_token: Some("AQD-secret".to_string()),
            expires_in: 3600,
        };
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("BQD-secret"));
        assert!(!rendered.contains("AQD-secret"));
    }
}
