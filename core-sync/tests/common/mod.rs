#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::credentials::{CredentialError, CredentialSource, LinkedTokens};
use bridge_traits::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource, TrackInfo};
use bridge_traits::status::{MessagingStatus, PublishError, StatusPublisher};
use bridge_traits::time::SystemClock;
use core_auth::UserId;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_sync::{PlaybackOrigin, SessionRegistry};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn song_a() -> Result<PlaybackSnapshot, PlaybackError> {
    Ok(PlaybackSnapshot::playing(TrackInfo::new(
        "Song A",
        ["Artist X"],
    )))
}

pub fn not_playing() -> Result<PlaybackSnapshot, PlaybackError> {
    Ok(PlaybackSnapshot::not_playing())
}

pub fn transient() -> Result<PlaybackSnapshot, PlaybackError> {
    Err(PlaybackError::Transient("connection reset".to_string()))
}

pub const SONG_A_STATUS: &str = "Listening to: Song A – Artist X";

/// Plays back a fixed script of poll results; the last entry repeats.
pub struct ScriptedPlayback {
    script: Mutex<VecDeque<Result<PlaybackSnapshot, PlaybackError>>>,
    tokens_seen: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedPlayback {
    pub fn new(script: Vec<Result<PlaybackSnapshot, PlaybackError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            tokens_seen: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Every poll takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.tokens_seen.lock().unwrap().len()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSource for ScriptedPlayback {
    async fn current_playback(
        &self,
        _user_id: &str,
        access_token: &str,
    ) -> Result<PlaybackSnapshot, PlaybackError> {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or_else(not_playing)
        }
    }
}

/// Records every published status; can be told to fail upcoming publishes.
pub struct RecordingPublisher {
    current: Mutex<MessagingStatus>,
    published: Mutex<Vec<MessagingStatus>>,
    failures: Mutex<VecDeque<PublishError>>,
    latency: Duration,
}

impl RecordingPublisher {
    pub fn with_status(text: &str, icon: &str) -> Self {
        Self {
            current: Mutex::new(MessagingStatus::new(text, icon)),
            published: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
        }
    }

    /// Every read and update takes `latency` before it lands.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn fail_next(&self, error: PublishError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn published(&self) -> Vec<MessagingStatus> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_texts(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .map(|status| status.text)
            .collect()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn get_status(&self, _access_token: &str) -> Result<MessagingStatus, PublishError> {
        self.round_trip().await;
        Ok(self.current.lock().unwrap().clone())
    }

    async fn set_status(
        &self,
        _access_token: &str,
        status: &MessagingStatus,
    ) -> Result<(), PublishError> {
        self.round_trip().await;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        *self.current.lock().unwrap() = status.clone();
        self.published.lock().unwrap().push(status.clone());
        Ok(())
    }
}

/// Fixed tokens per user; refresh hands out `BQD-refreshed`.
pub struct StaticCredentials {
    tokens: Mutex<Vec<(String, LinkedTokens)>>,
    refreshes: Mutex<u32>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(Vec::new()),
            refreshes: Mutex::new(0),
        }
    }

    pub fn link(&self, user_id: &str, messaging: bool, playback: bool) {
        let tokens = LinkedTokens {
            messaging_token: messaging.then(|| "xoxp-1".to_string()),
            playback_access_token: playback.then(|| "BQD-1".to_string()),
            playback_refresh_token: playback.then(|| "AQD-1".to_string()),
        };
        self.tokens
            .lock()
            .unwrap()
            .push((user_id.to_string(), tokens));
    }

    pub fn refreshes(&self) -> u32 {
        *self.refreshes.lock().unwrap()
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn get_tokens(&self, user_id: &str) -> Result<LinkedTokens, CredentialError> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, tokens)| tokens.clone())
            .ok_or_else(|| CredentialError::NotLinked(user_id.to_string()))
    }

    async fn refresh(
        &self,
        _user_id: &str,
        _refresh_token: &str,
    ) -> Result<String, CredentialError> {
        *self.refreshes.lock().unwrap() += 1;
        Ok("BQD-refreshed".to_string())
    }
}

pub struct Harness {
    pub registry: SessionRegistry,
    pub playback: Arc<ScriptedPlayback>,
    pub publisher: Arc<RecordingPublisher>,
    pub credentials: Arc<StaticCredentials>,
    pub events: Receiver<CoreEvent>,
}

impl Harness {
    pub async fn new(script: Vec<Result<PlaybackSnapshot, PlaybackError>>) -> Self {
        Self::with_collaborators(
            ScriptedPlayback::new(script),
            RecordingPublisher::with_status("Away", ":palm_tree:"),
        )
        .await
    }

    pub async fn with_collaborators(
        playback: ScriptedPlayback,
        publisher: RecordingPublisher,
    ) -> Self {
        let playback = Arc::new(playback);
        let publisher = Arc::new(publisher);
        let credentials = Arc::new(StaticCredentials::new());
        credentials.link("U1", true, true);

        let event_bus = EventBus::new(128);
        let events = event_bus.subscribe();

        let registry = SessionRegistry::new(
            credentials.clone(),
            publisher.clone(),
            SyncSettings::default(),
            event_bus,
            Arc::new(SystemClock),
        );
        registry
            .register_playback_source(PlaybackOrigin::Spotify, playback.clone())
            .await;

        Self {
            registry,
            playback,
            publisher,
            credentials,
            events,
        }
    }

    /// Drain every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
