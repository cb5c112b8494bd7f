//! Spotify Web API connector implementation
//!
//! Implements the `PlaybackSource` trait on top of the player endpoint.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource, TrackInfo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{ErrorResponse, PlayerResponse};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Spotify Web API connector
///
/// Stateless: the access token is supplied on every call, so one connector
/// serves every user.
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
/// use bridge_traits::playback::PlaybackSource;
///
/// let connector = SpotifyConnector::new(http_client);
/// let snapshot = connector.current_playback("U123", &access_token).await?;
/// ```
pub struct SpotifyConnector {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    request_timeout: Duration,
}

impl SpotifyConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: SPOTIFY_API_BASE.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the connector at another API root (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fetch and interpret the player state.
    async fn fetch_player(&self, access_token: &str) -> Result<PlaybackSnapshot> {
        let request = HttpRequest::get(format!("{}/me/player", self.api_base))
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await?;

        match response.status {
            200 => Self::parse_player(&response),
            // No active device
            204 => Ok(PlaybackSnapshot::not_playing()),
            401 => Err(SpotifyError::Unauthorized),
            429 => Err(SpotifyError::RateLimitExceeded {
                retry_after_seconds: response.retry_after().map_or(0, |d| d.as_secs()),
            }),
            status => Err(SpotifyError::ApiError {
                status_code: status,
                message: Self::error_message(&response),
            }),
        }
    }

    fn parse_player(response: &HttpResponse) -> Result<PlaybackSnapshot> {
        // An empty 200 body happens when nothing was ever played on the account.
        if response.body.is_empty() {
            return Ok(PlaybackSnapshot::not_playing());
        }

        let player: PlayerResponse = response.json().map_err(|e| {
            SpotifyError::ParseError(format!("Failed to parse player response: {}", e))
        })?;

        let non_track_type = player
            .currently_playing_type
            .as_deref()
            .is_some_and(|kind| kind != "track");

        let track = match player.item {
            Some(item) if item.is_track() && !non_track_type => Some(TrackInfo::new(
                item.name,
                item.artists.into_iter().map(|artist| artist.name),
            )),
            _ => None,
        };

        Ok(PlaybackSnapshot {
            is_playing: player.is_playing && track.is_some(),
            track,
        })
    }

    fn error_message(response: &HttpResponse) -> String {
        response
            .json::<ErrorResponse>()
            .map(|body| body.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string())
    }
}

#[async_trait]
impl PlaybackSource for SpotifyConnector {
    #[instrument(skip(self, access_token))]
    async fn current_playback(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> std::result::Result<PlaybackSnapshot, PlaybackError> {
        match self.fetch_player(access_token).await {
            Ok(snapshot) => {
                debug!(
                    is_playing = snapshot.is_playing,
                    track = snapshot.track.as_ref().map(|t| t.name.as_str()),
                    "Fetched playback"
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Playback lookup failed");
                Err(e.into())
            }
        }
    }
}
