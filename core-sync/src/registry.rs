//! # Session Registry
//!
//! Owns every session and guarantees at most one live worker per user.
//!
//! ## Overview
//!
//! `start` launches a [`SyncWorker`](crate::worker) as its own tokio task.
//! Starting again for the same user supersedes the running session: the old
//! worker is asked to stop and awaited long enough to finish an in-flight
//! call and restore the original status before the new session captures
//! it. If the old worker still has not exited, the new session inherits its
//! original status instead of capturing whatever is shown at that moment.
//! Starts are serialized, so two concurrent `start` calls still leave one
//! worker.
//!
//! Snapshots of finished sessions stay available through `status` until the
//! user starts again or is `reset`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{PlaybackOrigin, SessionRegistry};
//!
//! registry
//!     .register_playback_source(PlaybackOrigin::Spotify, spotify)
//!     .await;
//! registry.start(&user_id, PlaybackOrigin::Spotify).await?;
//!
//! if let Some(session) = registry.status(&user_id).await {
//!     println!("{} errors", session.consecutive_errors);
//! }
//!
//! registry.stop(&user_id).await?;
//! ```

use crate::session::{PlaybackOrigin, Session, SessionCell, SessionId, SessionState};
use crate::worker::{SyncWorker, WorkerDeps};
use crate::{Result, SyncError};
use bridge_traits::credentials::{CredentialError, CredentialSource, LinkedTokens};
use bridge_traits::playback::PlaybackSource;
use bridge_traits::status::{MessagingStatus, StatusPublisher};
use bridge_traits::time::Clock;
use core_auth::UserId;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

struct LiveWorker {
    session_id: SessionId,
    cell: Arc<SessionCell>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    /// Latest session per user, live or finished.
    sessions: HashMap<UserId, Arc<SessionCell>>,
    /// Workers that have not exited yet.
    live: HashMap<UserId, LiveWorker>,
}

pub struct SessionRegistry {
    deps: WorkerDeps,
    sources: RwLock<HashMap<PlaybackOrigin, Arc<dyn PlaybackSource>>>,
    state: Arc<Mutex<RegistryState>>,
    start_lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        publisher: Arc<dyn StatusPublisher>,
        settings: SyncSettings,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            deps: WorkerDeps {
                credentials,
                publisher,
                event_bus,
                clock,
                settings,
            },
            sources: RwLock::new(HashMap::new()),
            state: Arc::new(Mutex::new(RegistryState::default())),
            start_lock: Mutex::new(()),
        }
    }

    /// Register where sessions of `origin` read playback from.
    pub async fn register_playback_source(
        &self,
        origin: PlaybackOrigin,
        source: Arc<dyn PlaybackSource>,
    ) {
        let mut sources = self.sources.write().await;
        sources.insert(origin, source);
        info!("Registered playback source: {}", origin);
    }

    /// Start syncing `user_id`, superseding any running session.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceUnavailable`] if no source is registered for `origin`
    /// - [`SyncError::CredentialsMissing`] if a required account is not linked
    /// - [`SyncError::Credential`] if the credential store cannot be read
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn start(&self, user_id: &UserId, origin: PlaybackOrigin) -> Result<SessionId> {
        let _serialized = self.start_lock.lock().await;

        let playback = {
            let sources = self.sources.read().await;
            sources
                .get(&origin)
                .cloned()
                .ok_or_else(|| SyncError::SourceUnavailable(origin.to_string()))?
        };

        let tokens = self.usable_tokens(user_id, origin).await?;

        let previous = self.state.lock().await.live.remove(user_id);
        let mut inherited = None;
        if let Some(previous) = previous {
            info!(
                previous_session = %previous.session_id,
                "Superseding running session"
            );
            let previous_cell = Arc::clone(&previous.cell);
            if !self.retire(previous, self.shutdown_grace()).await {
                // Whatever is shown now may still be the old session's track.
                inherited = previous_cell.snapshot().original_status;
            }
        }

        let now = self.deps.clock.now();
        let mut session = Session::new(user_id.clone(), origin, now);
        session.original_status = inherited;
        session.transition(SessionState::Running, now)?;
        let session_id = session.session_id;
        let cell = SessionCell::new(session);

        let worker = SyncWorker::new(cell.clone(), tokens, playback, self.deps.clone());

        {
            // Spawn under the lock so the exit cleanup cannot run before the insert.
            let mut state = self.state.lock().await;
            let handle = self.spawn_worker(worker, user_id.clone(), session_id);
            state.sessions.insert(user_id.clone(), cell.clone());
            state.live.insert(
                user_id.clone(),
                LiveWorker {
                    session_id,
                    cell,
                    handle,
                },
            );
        }

        info!(session_id = %session_id, origin = %origin, "Sync session started");
        self.deps
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::SessionStarted {
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                origin: origin.to_string(),
            }))
            .ok();

        Ok(session_id)
    }

    /// Ask the worker of `user_id` to restore and exit. No-op without a session.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn stop(&self, user_id: &UserId) -> Result<()> {
        let cell = self.state.lock().await.sessions.get(user_id).cloned();

        match cell {
            Some(cell) => {
                cell.request_stop(self.deps.clock.now());
                info!("Stop requested");
            }
            None => debug!("No session to stop"),
        }
        Ok(())
    }

    /// Snapshot of the latest session of `user_id`.
    pub async fn status(&self, user_id: &UserId) -> Option<Session> {
        let state = self.state.lock().await;
        state.sessions.get(user_id).map(|cell| cell.snapshot())
    }

    /// Change feed of the latest session of `user_id`.
    pub async fn subscribe(&self, user_id: &UserId) -> Option<watch::Receiver<Session>> {
        let state = self.state.lock().await;
        state.sessions.get(user_id).map(|cell| cell.subscribe())
    }

    /// Sessions currently in the `Running` state, ordered by user.
    pub async fn list(&self) -> Vec<Session> {
        let state = self.state.lock().await;
        let mut running: Vec<Session> = state
            .sessions
            .values()
            .map(|cell| cell.snapshot())
            .filter(Session::is_running)
            .collect();
        running.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        running
    }

    /// Drop everything known about `user_id`.
    ///
    /// A live worker is told to stop first, so it still restores the
    /// original status instead of running on unseen.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn reset(&self, user_id: &UserId) {
        let live = {
            let mut state = self.state.lock().await;
            state.sessions.remove(user_id);
            state.live.remove(user_id)
        };

        if let Some(live) = live {
            self.retire(live, self.deps.settings.handover_grace).await;
        }
        info!("Session bookkeeping reset");
    }

    /// Replace the status restored when `user_id`'s session ends.
    pub async fn set_original_status(
        &self,
        user_id: &UserId,
        status: MessagingStatus,
    ) -> Result<()> {
        let cell = self.state.lock().await.sessions.get(user_id).cloned();
        let cell = cell.ok_or_else(|| SyncError::SessionNotFound {
            user_id: user_id.to_string(),
        })?;

        debug!(user_id = %user_id, text = %status.text, "Original status replaced");
        cell.update(|session| session.original_status = Some(status));
        Ok(())
    }

    /// Whether a worker task for `user_id` has not exited yet.
    pub async fn is_live(&self, user_id: &UserId) -> bool {
        self.state.lock().await.live.contains_key(user_id)
    }

    /// Stop every worker and wait for their restores.
    pub async fn shutdown(&self) {
        let live: Vec<LiveWorker> = {
            let mut state = self.state.lock().await;
            state.live.drain().map(|(_, worker)| worker).collect()
        };

        if live.is_empty() {
            return;
        }

        info!(sessions = live.len(), "Stopping all sync sessions");
        let now = self.deps.clock.now();
        for worker in &live {
            worker.cell.request_stop(now);
        }

        let grace = self.shutdown_grace();
        let waits = live.into_iter().map(|worker| async move {
            if timeout(grace, worker.handle).await.is_err() {
                warn!(session_id = %worker.session_id, "Worker did not stop in time");
            }
        });
        join_all(waits).await;
    }

    fn shutdown_grace(&self) -> Duration {
        // Room for one in-flight call plus the restore publish.
        self.deps.settings.handover_grace + self.deps.settings.request_timeout * 2
    }

    /// Signal a live worker and wait up to `grace` for it to exit.
    /// Returns whether it did.
    async fn retire(&self, worker: LiveWorker, grace: Duration) -> bool {
        worker.cell.request_stop(self.deps.clock.now());

        match timeout(grace, worker.handle).await {
            Ok(_) => {
                debug!(session_id = %worker.session_id, "Previous worker exited");
                true
            }
            Err(_) => {
                warn!(
                    session_id = %worker.session_id,
                    "Previous worker still busy, it will exit at its next loop boundary"
                );
                false
            }
        }
    }

    fn spawn_worker(
        &self,
        worker: SyncWorker,
        user_id: UserId,
        session_id: SessionId,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let outcome = worker.run().await;
            debug!(user_id = %user_id, session_id = %session_id, state = %outcome, "Worker exited");

            let mut state = state.lock().await;
            let current = state
                .live
                .get(&user_id)
                .is_some_and(|live| live.session_id == session_id);
            if current {
                state.live.remove(&user_id);
            }
        })
    }

    async fn usable_tokens(&self, user_id: &UserId, origin: PlaybackOrigin) -> Result<LinkedTokens> {
        let tokens = match self.deps.credentials.get_tokens(user_id.as_str()).await {
            Ok(tokens) => tokens,
            Err(CredentialError::NotLinked(_)) => LinkedTokens::default(),
            Err(e) => {
                error!(error = %e, "Could not load credentials");
                return Err(e.into());
            }
        };

        let mut missing = Vec::new();
        if !tokens.has_messaging() {
            missing.push("messaging");
        }
        if origin.requires_playback_token() && !tokens.has_playback() {
            missing.push("playback");
        }

        if !missing.is_empty() {
            warn!(missing = ?missing, "Refusing to start without credentials");
            return Err(SyncError::CredentialsMissing {
                user_id: user_id.to_string(),
                missing: missing.join(" and "),
            });
        }

        Ok(tokens)
    }
}
