//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, key/value
//! storage, clock) into the credential manager, the playback and messaging
//! connectors and the session registry, and exposes the result over HTTP
//! (see [`api`]). Desktop hosts enable the `desktop-shims` feature, which
//! builds the dependencies from `bridge-desktop`.

pub mod api;
pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    playback::PlaybackSource,
    storage::KeyValueStore,
    time::Clock,
};
use core_auth::{AccountStore, CredentialManager, OAuthRefresher, TokenRefresher};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, Receiver, RecvError};
use core_sync::{PlaybackOrigin, ReportedPlaybackSource, SessionRegistry};
use provider_slack::SlackConnector;
use provider_spotify::SpotifyConnector;
use tracing::{debug, error, info, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub key_value_store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        key_value_store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            key_value_store,
            clock,
        }
    }

    /// Reqwest HTTP client plus the SQLite store at `config.database_path`.
    #[cfg(feature = "desktop-shims")]
    pub async fn desktop(config: &CoreConfig) -> Result<Self> {
        use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore};
        use bridge_traits::time::SystemClock;

        let http_client = ReqwestHttpClient::with_timeout(config.sync.request_timeout)?;
        let store = SqliteKeyValueStore::open(&config.database_path).await?;

        Ok(Self::new(
            Arc::new(http_client),
            Arc::new(store),
            Arc::new(SystemClock),
        ))
    }
}

struct ServiceInner {
    config: CoreConfig,
    credentials: Arc<CredentialManager>,
    registry: SessionRegistry,
    reported_playback: Arc<ReportedPlaybackSource>,
    event_bus: EventBus,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Wire every component from `config` and `deps`.
    ///
    /// Token refresh is enabled only when the configuration carries a
    /// playback OAuth client.
    pub async fn bootstrap(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        let event_bus = EventBus::new(config.event_buffer_size);

        let refresher: Option<Arc<dyn TokenRefresher>> = config.spotify.clone().map(|client| {
            Arc::new(OAuthRefresher::new(
                client,
                Arc::clone(&deps.http_client),
                config.sync.request_timeout,
            )) as Arc<dyn TokenRefresher>
        });
        if refresher.is_none() {
            warn!("No Spotify OAuth client configured, expired playback tokens cannot be refreshed");
        }

        let credentials = Arc::new(CredentialManager::new(
            AccountStore::new(Arc::clone(&deps.key_value_store)),
            refresher,
            event_bus.clone(),
            Arc::clone(&deps.clock),
        ));

        let spotify = SpotifyConnector::new(Arc::clone(&deps.http_client))
            .with_timeout(config.sync.request_timeout);
        let slack = SlackConnector::new(Arc::clone(&deps.http_client))
            .with_timeout(config.sync.request_timeout);
        let reported_playback = Arc::new(ReportedPlaybackSource::new(
            config.sync.report_staleness,
        ));

        let registry = SessionRegistry::new(
            credentials.clone(),
            Arc::new(slack),
            config.sync.clone(),
            event_bus.clone(),
            Arc::clone(&deps.clock),
        );
        registry
            .register_playback_source(PlaybackOrigin::Spotify, Arc::new(spotify))
            .await;
        registry
            .register_playback_source(
                PlaybackOrigin::Browser,
                reported_playback.clone() as Arc<dyn PlaybackSource>,
            )
            .await;

        info!(
            poll_interval = ?config.sync.poll_interval,
            error_backoff = ?config.sync.error_backoff,
            token_refresh = config.can_refresh_playback_tokens(),
            "Core service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                credentials,
                registry,
                reported_playback,
                event_bus,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Push-fed source behind [`PlaybackOrigin::Browser`] sessions.
    pub fn reported_playback(&self) -> &ReportedPlaybackSource {
        &self.inner.reported_playback
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Mirror bus events into the log until the bus closes.
    pub fn spawn_event_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.subscribe_events();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Event logger lagged behind the bus")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Stop every session, restoring original statuses.
    pub async fn shutdown(&self) {
        info!("Shutting down core service");
        self.inner.registry.shutdown().await;
    }
}

fn log_event(event: &CoreEvent) {
    let user_id = event.user_id();
    match event.severity() {
        EventSeverity::Error => error!(user_id, event = ?event, "{}", event.description()),
        EventSeverity::Warning => warn!(user_id, event = ?event, "{}", event.description()),
        EventSeverity::Info => info!(user_id, "{}", event.description()),
        EventSeverity::Debug => debug!(user_id, "{}", event.description()),
    }
}
