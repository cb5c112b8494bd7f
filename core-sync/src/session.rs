//! # Sync Session State Machine
//!
//! Per-user record of synchronization state with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Stopping → Stopped
//!           ↓          ↓
//!           └──────→ Failed
//! ```
//!
//! `Stopped` and `Failed` are terminal. A session is never restarted; a new
//! `start` creates a fresh session with a new [`SessionId`].
//!
//! The live copy sits in a [`SessionCell`] shared between the worker that
//! owns it and the registry that hands out snapshots. Writers go through
//! [`SessionCell::update`], so a reader always observes a whole session,
//! never a half-applied iteration.

use crate::{Result, SyncError};
use bridge_traits::{MessagingStatus, TrackInfo};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier of one session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Origin
// ============================================================================

/// Where a session reads playback from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackOrigin {
    /// Streaming-service API polled with the user's playback token.
    #[default]
    Spotify,
    /// Snapshots pushed by the browser extension.
    Browser,
}

impl PlaybackOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackOrigin::Spotify => "spotify",
            PlaybackOrigin::Browser => "browser",
        }
    }

    /// Whether sessions of this origin need a linked playback account.
    pub fn requires_playback_token(&self) -> bool {
        matches!(self, PlaybackOrigin::Spotify)
    }
}

impl fmt::Display for PlaybackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackOrigin {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spotify" => Ok(PlaybackOrigin::Spotify),
            "browser" => Ok(PlaybackOrigin::Browser),
            other => Err(SyncError::SourceUnavailable(other.to_string())),
        }
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, worker not launched yet
    Idle,
    /// Worker is polling
    Running,
    /// Stop requested; the worker restores and exits at its next loop boundary
    Stopping,
    /// Worker exited after a stop request
    Stopped,
    /// Worker escalated after repeated errors and exited
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Snapshot of one user's sync session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub origin: PlaybackOrigin,
    pub state: SessionState,
    /// Status captured when the session started; restored on stop and
    /// whenever playback goes quiet.
    pub original_status: Option<MessagingStatus>,
    /// Text of the last status that was actually published.
    pub last_published_status: Option<String>,
    /// Last observed playing track.
    pub current_track: Option<TrackInfo>,
    /// Failed iterations since the last success.
    pub consecutive_errors: u32,
    pub last_update: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(user_id: UserId, origin: PlaybackOrigin, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            session_id: SessionId::new(),
            origin,
            state: SessionState::Idle,
            original_status: None,
            last_published_status: None,
            current_track: None,
            consecutive_errors: 0,
            last_update: now,
            started_at: now,
            last_error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Move to `to`, stamping `last_update`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] for any move the state
    /// machine does not allow, including every move out of a terminal state.
    pub fn transition(&mut self, to: SessionState, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(to)?;
        self.state = to;
        self.last_update = now;
        Ok(())
    }

    fn validate_transition(&self, to: SessionState) -> Result<()> {
        let valid = match (self.state, to) {
            (SessionState::Idle, SessionState::Running) => true,

            (SessionState::Running, SessionState::Stopping) => true,
            (SessionState::Running, SessionState::Stopped) => true,
            (SessionState::Running, SessionState::Failed) => true,

            (SessionState::Stopping, SessionState::Stopped) => true,
            (SessionState::Stopping, SessionState::Failed) => true,

            (SessionState::Stopped, _) => false,
            (SessionState::Failed, _) => false,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.state.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Shared cell
// ============================================================================

/// Live session shared by its worker and the registry.
pub(crate) struct SessionCell {
    snapshot: watch::Sender<Session>,
    cancel: CancellationToken,
}

impl SessionCell {
    pub(crate) fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            snapshot: watch::Sender::new(session),
            cancel: CancellationToken::new(),
        })
    }

    pub(crate) fn snapshot(&self) -> Session {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshot.subscribe()
    }

    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Session),
    {
        self.snapshot.send_modify(f);
    }

    /// Flag the session as `Stopping` and wake the worker if it is asleep.
    pub(crate) fn request_stop(&self, now: DateTime<Utc>) {
        self.cancel.cancel();
        self.snapshot.send_if_modified(|session| {
            session.state == SessionState::Running
                && session.transition(SessionState::Stopping, now).is_ok()
        });
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled() || self.snapshot.borrow().state == SessionState::Stopping
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
