//! # Core Configuration Module
//!
//! Builder-based configuration for the status sync service.
//!
//! ## Overview
//!
//! [`CoreConfig`] collects the network, storage and timing settings the
//! service needs. [`CoreConfigBuilder::build`] validates everything up front
//! so that a misconfigured process fails at startup rather than inside a
//! running sync worker.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/status-sync/tokens.db")
//!     .poll_interval(Duration::from_secs(20))
//!     .spotify_client("client-id", "client-secret")
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(config.sync.poll_interval, Duration::from_secs(20));
//! assert_eq!(config.sync.error_backoff, Duration::from_secs(10));
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listen address of the HTTP control surface.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:1605";

/// Default location of the linked-accounts database.
pub const DEFAULT_DATABASE_PATH: &str = "status-sync.db";

/// Default token endpoint for the playback service.
pub const DEFAULT_SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Timing and threshold settings of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Delay between two successful polls.
    pub poll_interval: Duration,
    /// Delay before the next poll after a failed iteration.
    pub error_backoff: Duration,
    /// Consecutive failures tolerated; one more escalates.
    pub max_consecutive_errors: u32,
    /// How long `start` waits for a superseded worker to exit.
    pub handover_grace: Duration,
    /// Upper bound on any single collaborator call.
    pub request_timeout: Duration,
    /// Age after which a browser-reported snapshot counts as silence.
    pub report_staleness: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(10),
            max_consecutive_errors: 3,
            handover_grace: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            report_staleness: Duration::from_secs(90),
        }
    }
}

impl SyncSettings {
    fn validate(&self) -> Result<()> {
        let non_zero = [
            ("poll_interval", self.poll_interval),
            ("error_backoff", self.error_backoff),
            ("request_timeout", self.request_timeout),
            ("report_staleness", self.report_staleness),
        ];

        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.report_staleness < self.poll_interval {
            return Err(Error::Config(
                "report_staleness must be at least one poll_interval".to_string(),
            ));
        }

        Ok(())
    }
}

/// OAuth client registered with the playback service.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl fmt::Debug for OAuthClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Service configuration. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Address the HTTP control surface listens on
    pub bind_address: SocketAddr,

    /// Path to the SQLite database holding linked accounts
    pub database_path: PathBuf,

    /// Sync engine timings
    pub sync: SyncSettings,

    /// Playback-service OAuth client, required for token refresh
    pub spotify: Option<OAuthClientSettings>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether access tokens of the playback service can be refreshed.
    pub fn can_refresh_playback_tokens(&self) -> bool {
        self.spotify.is_some()
    }

    fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than zero".to_string(),
            ));
        }

        if let Some(spotify) = &self.spotify {
            if spotify.client_id.trim().is_empty() {
                return Err(Error::CapabilityMissing {
                    capability: "SpotifyOAuthClient".to_string(),
                    message: "client_id is empty. Set SPOTIFY_CLIENT_ID or omit the client \
                              to run without token refresh."
                        .to_string(),
                });
            }
            if spotify.client_secret.trim().is_empty() {
                return Err(Error::CapabilityMissing {
                    capability: "SpotifyOAuthClient".to_string(),
                    message: "client_secret is empty. Set SPOTIFY_CLIENT_SECRET.".to_string(),
                });
            }
            if !spotify.token_url.starts_with("https://")
                && !spotify.token_url.starts_with("http://")
            {
                return Err(Error::Config(format!(
                    "token_url must be an http(s) URL, got {}",
                    spotify.token_url
                )));
            }
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    bind_address: Option<String>,
    database_path: Option<PathBuf>,
    sync: SyncSettings,
    spotify_client: Option<(String, String)>,
    spotify_token_url: Option<String>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Listen address, e.g. `0.0.0.0:1605`.
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = Some(address.into());
        self
    }

    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.sync.poll_interval = interval;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.sync.error_backoff = backoff;
        self
    }

    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.sync.max_consecutive_errors = max;
        self
    }

    pub fn handover_grace(mut self, grace: Duration) -> Self {
        self.sync.handover_grace = grace;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.sync.request_timeout = timeout;
        self
    }

    pub fn report_staleness(mut self, staleness: Duration) -> Self {
        self.sync.report_staleness = staleness;
        self
    }

    /// Replace every sync timing at once.
    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    /// Register the playback-service OAuth client used for token refresh.
    pub fn spotify_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.spotify_client = Some((client_id.into(), client_secret.into()));
        self
    }

    /// Override the token endpoint (tests, proxies).
    pub fn spotify_token_url(mut self, url: impl Into<String>) -> Self {
        self.spotify_token_url = Some(url.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed values and
    /// [`Error::CapabilityMissing`] for an incomplete OAuth client.
    pub fn build(self) -> Result<CoreConfig> {
        let bind_address = self
            .bind_address
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDRESS)
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;

        let database_path = self
            .database_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let token_url = self
            .spotify_token_url
            .unwrap_or_else(|| DEFAULT_SPOTIFY_TOKEN_URL.to_string());
        let spotify = self
            .spotify_client
            .map(|(client_id, client_secret)| OAuthClientSettings {
                client_id,
                client_secret,
                token_url,
            });

        let config = CoreConfig {
            bind_address,
            database_path,
            sync: self.sync,
            spotify,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
