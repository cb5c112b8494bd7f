//! # Sync Worker
//!
//! Drives one session: samples playback, publishes the matching status,
//! and restores the original status when playback stops or the session
//! ends.
//!
//! ## Loop
//!
//! ```text
//! Initializing ──> wait ──> stop requested? ──yes──> Restoring ──> Stopped
//!                   ↑              │no
//!                   │              ↓
//!                   └──────── Polling ⇄ Publishing
//!                                  │ too many errors
//!                                  ↓
//!                              Restoring ──> Failed
//! ```
//!
//! The first poll runs right after the original status is captured. After a
//! successful iteration the worker waits the poll interval, after a failed
//! one whatever the [`BackoffPolicy`] decides. A stop request cuts the wait
//! short, but the session state is only inspected at the loop boundary, so
//! an iteration in flight always completes first.
//!
//! Every collaborator call is bounded by the configured request timeout; a
//! call that overruns counts as a transient error.

use crate::policy::{BackoffPolicy, Decision, ErrorKind};
use crate::session::{SessionCell, SessionId, SessionState};
use crate::{Result, SyncError};
use bridge_traits::credentials::{CredentialSource, LinkedTokens};
use bridge_traits::playback::{PlaybackError, PlaybackSnapshot, PlaybackSource, TrackInfo};
use bridge_traits::status::{MessagingStatus, StatusPublisher};
use bridge_traits::time::Clock;
use core_auth::UserId;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

/// Icon published alongside a now-playing status.
pub const NOW_PLAYING_ICON: &str = ":musical_note:";

/// Status describing `track`, e.g. `Listening to: Song A – Artist X`.
pub fn now_playing_status(track: &TrackInfo) -> MessagingStatus {
    MessagingStatus::new(
        format!("Listening to: {} – {}", track.name, track.joined_artists()),
        NOW_PLAYING_ICON,
    )
}

/// Collaborators shared by every worker of a registry.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub credentials: Arc<dyn CredentialSource>,
    pub publisher: Arc<dyn StatusPublisher>,
    pub event_bus: EventBus,
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
}

pub(crate) struct SyncWorker {
    cell: Arc<SessionCell>,
    user_id: UserId,
    session_id: SessionId,
    tokens: LinkedTokens,
    playback: Arc<dyn PlaybackSource>,
    deps: WorkerDeps,
    policy: BackoffPolicy,
}

impl SyncWorker {
    pub(crate) fn new(
        cell: Arc<SessionCell>,
        tokens: LinkedTokens,
        playback: Arc<dyn PlaybackSource>,
        deps: WorkerDeps,
    ) -> Self {
        let session = cell.snapshot();
        Self {
            user_id: session.user_id,
            session_id: session.session_id,
            policy: BackoffPolicy::from_settings(&deps.settings),
            cell,
            tokens,
            playback,
            deps,
        }
    }

    /// Run until stopped or escalated. Returns the terminal state.
    #[instrument(
        name = "sync_worker",
        skip_all,
        fields(user_id = %self.user_id, session_id = %self.session_id)
    )]
    pub(crate) async fn run(mut self) -> SessionState {
        info!("Sync worker started");
        self.capture_original_status().await;

        let mut delay = Duration::ZERO;
        loop {
            self.pause(delay).await;

            if self.cell.stop_requested() {
                return self.finish_stopped().await;
            }

            delay = match self.iterate().await {
                Ok(()) => {
                    self.record_success();
                    self.deps.settings.poll_interval
                }
                Err(err) => match self.record_failure(&err) {
                    Decision::RetryAfter(delay) => delay,
                    Decision::Escalate => return self.finish_failed(err).await,
                    // Playback refreshes happen inside the poll; nothing left to refresh.
                    Decision::RefreshAndRetry => self.policy.error_backoff,
                },
            };
        }
    }

    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }

        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.cell.cancelled() => debug!("Stop requested during wait"),
        }
    }

    /// Best-effort read of the status to restore later. Never fails the session.
    async fn capture_original_status(&self) {
        if self.cell.snapshot().original_status.is_some() {
            debug!("Original status already known, skipping capture");
            return;
        }

        let captured = self
            .bounded(
                "status lookup",
                self.deps.publisher.get_status(self.messaging_token()),
            )
            .await
            .and_then(|result| result.map_err(SyncError::from));

        let status = match captured {
            Ok(status) => {
                debug!(text = %status.text, icon = %status.icon, "Captured original status");
                status
            }
            Err(e) => {
                warn!(error = %e, "Could not read current status, will restore an empty one");
                MessagingStatus::empty()
            }
        };

        self.cell.update(|session| {
            session.original_status.get_or_insert(status);
        });
    }

    /// One Polling step, plus Publishing when the status has to change.
    async fn iterate(&mut self) -> Result<()> {
        let snapshot = self.fetch_playback().await?;
        let session = self.cell.snapshot();
        let original = session.original_status.clone().unwrap_or_default();

        let target = match snapshot.now_playing() {
            Some(track) => {
                let track = track.clone();
                let status = now_playing_status(&track);
                self.cell.update(|session| session.current_track = Some(track));

                let changed = session.last_published_status.as_deref() != Some(status.text.as_str());
                changed.then_some((status, false))
            }
            None => {
                if session.current_track.is_some() {
                    self.cell.update(|session| session.current_track = None);
                }

                // The first quiet poll re-asserts the original once.
                let restored =
                    session.last_published_status.as_deref() == Some(original.text.as_str());
                (!restored).then_some((original, true))
            }
        };

        match target {
            Some((status, restoring)) => self.publish(&status, restoring).await,
            None => {
                trace!("Status unchanged");
                Ok(())
            }
        }
    }

    /// Read playback, refreshing the access token at most once.
    async fn fetch_playback(&mut self) -> Result<PlaybackSnapshot> {
        let mut refreshed = false;

        loop {
            let token = self.tokens.playback_access_token.clone().unwrap_or_default();
            let result = self
                .bounded(
                    "playback lookup",
                    self.playback.current_playback(self.user_id.as_str(), &token),
                )
                .await?;

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(PlaybackError::Transient(message)) => {
                    return Err(SyncError::Transient(message));
                }
                Err(PlaybackError::AuthExpired) => {
                    let kind = ErrorKind::AuthExpired {
                        refreshable: !refreshed,
                    };
                    let errors = self.cell.snapshot().consecutive_errors;
                    if self.policy.decide(&kind, errors) != Decision::RefreshAndRetry {
                        return Err(SyncError::AuthExpired(
                            "playback token rejected after refresh".to_string(),
                        ));
                    }

                    refreshed = true;
                    self.refresh_playback_token().await?;
                }
            }
        }
    }

    async fn refresh_playback_token(&mut self) -> Result<()> {
        let Some(refresh_token) = self.tokens.playback_refresh_token.clone() else {
            return Err(SyncError::Credential(
                "playback token expired and no refresh token is linked".to_string(),
            ));
        };

        info!("Playback token expired, refreshing");
        let access_token = self
            .bounded(
                "token refresh",
                self.deps
                    .credentials
                    .refresh(self.user_id.as_str(), &refresh_token),
            )
            .await??;

        self.tokens.playback_access_token = Some(access_token);
        Ok(())
    }

    async fn publish(&self, status: &MessagingStatus, restoring: bool) -> Result<()> {
        self.bounded(
            "status update",
            self.deps
                .publisher
                .set_status(self.messaging_token(), status),
        )
        .await??;

        let now = self.deps.clock.now();
        let text = status.text.clone();
        self.cell.update(|session| {
            session.last_published_status = Some(text);
            session.last_update = now;
        });

        if restoring {
            info!(text = %status.text, "Restored original status");
            self.emit(SyncEvent::StatusRestored {
                user_id: self.user_id.to_string(),
                session_id: self.session_id.to_string(),
            });
        } else {
            info!(text = %status.text, "Published status");
            self.emit(SyncEvent::StatusPublished {
                user_id: self.user_id.to_string(),
                session_id: self.session_id.to_string(),
                text: status.text.clone(),
            });
        }

        Ok(())
    }

    fn record_success(&self) {
        self.cell.update(|session| session.consecutive_errors = 0);
    }

    fn record_failure(&self, err: &SyncError) -> Decision {
        let kind = ErrorKind::from(err);
        let mut errors = 0;
        self.cell.update(|session| {
            if kind.is_counted() {
                session.consecutive_errors += 1;
            }
            session.last_error = Some(err.to_string());
            errors = session.consecutive_errors;
        });

        let decision = self.policy.decide(&kind, errors);
        if let Decision::RetryAfter(delay) = decision {
            warn!(
                consecutive_errors = errors,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "Sync iteration failed"
            );
            self.emit(SyncEvent::SyncDegraded {
                user_id: self.user_id.to_string(),
                session_id: self.session_id.to_string(),
                consecutive_errors: errors,
                message: err.to_string(),
            });
        }
        decision
    }

    /// Publish the original status once, ignoring failure.
    async fn restore_original(&self) {
        let original = self.cell.snapshot().original_status.unwrap_or_default();
        if let Err(e) = self.publish(&original, true).await {
            warn!(error = %e, "Could not restore original status");
        }
    }

    async fn finish_stopped(&self) -> SessionState {
        self.restore_original().await;

        let now = self.deps.clock.now();
        self.cell.update(|session| {
            if let Err(e) = session.transition(SessionState::Stopped, now) {
                warn!(error = %e, "Unexpected session state while stopping");
            }
        });

        info!("Sync session stopped");
        self.emit(SyncEvent::SessionStopped {
            user_id: self.user_id.to_string(),
            session_id: self.session_id.to_string(),
        });
        SessionState::Stopped
    }

    async fn finish_failed(&self, err: SyncError) -> SessionState {
        let failure = SyncError::PersistentFailure {
            attempts: self.cell.snapshot().consecutive_errors,
            message: err.to_string(),
        };
        error!(error = %failure, "Ending sync session");

        self.restore_original().await;

        let now = self.deps.clock.now();
        let message = failure.to_string();
        self.cell.update(|session| {
            session.last_error = Some(message.clone());
            if let Err(e) = session.transition(SessionState::Failed, now) {
                warn!(error = %e, "Unexpected session state while failing");
            }
        });

        self.emit(SyncEvent::SessionFailed {
            user_id: self.user_id.to_string(),
            session_id: self.session_id.to_string(),
            message,
        });
        SessionState::Failed
    }

    async fn bounded<F, T>(&self, what: &str, call: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let limit = self.deps.settings.request_timeout;
        timeout(limit, call)
            .await
            .map_err(|_| SyncError::Transient(format!("{} timed out after {:?}", what, limit)))
    }

    fn messaging_token(&self) -> &str {
        self.tokens.messaging_token.as_deref().unwrap_or_default()
    }

    fn emit(&self, event: SyncEvent) {
        self.deps.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}
