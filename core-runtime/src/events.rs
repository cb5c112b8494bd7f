//! # Event Bus System
//!
//! Typed lifecycle events broadcast over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Sync workers and the credential manager publish what happened to a
//! session or a linked account; anything interested (the service's audit
//! log, tests) subscribes independently. Publishing never blocks and never
//! fails the caller: emitters call `emit(..).ok()` and move on.
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Sync Worker ├──────────────>│           │     subscribe    ┌────────────┐
//! └─────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌─────────────┐     emit      │           │                  └────────────┘
//! │ Credentials ├──────────────>│           │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::SessionStopped {
//!         user_id: "U123".to_string(),
//!         session_id: "s-1".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync session stopped");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep reading.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Linked-account and token events
    Auth(AuthEvent),
    /// Sync session lifecycle events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::TokenRefreshFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::SessionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::SyncDegraded { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::SessionStarted { .. })
            | CoreEvent::Sync(SyncEvent::SessionStopped { .. })
            | CoreEvent::Auth(AuthEvent::AccountLinked { .. })
            | CoreEvent::Auth(AuthEvent::AccountUnlinked { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// The user the event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.user_id(),
            CoreEvent::Sync(e) => e.user_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to linked accounts and token maintenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A service account was linked or its tokens replaced.
    AccountLinked {
        user_id: String,
        /// `"messaging"` or `"playback"`.
        service: String,
    },
    /// Every linked account of the user was removed.
    AccountUnlinked { user_id: String },
    /// The playback access token was refreshed and persisted.
    TokenRefreshed { user_id: String },
    /// The refresh-token grant was rejected or could not be completed.
    TokenRefreshFailed { user_id: String, message: String },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::AccountLinked { .. } => "Account linked",
            AuthEvent::AccountUnlinked { .. } => "Accounts unlinked",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::TokenRefreshFailed { .. } => "Token refresh failed",
        }
    }

    fn user_id(&self) -> &str {
        match self {
            AuthEvent::AccountLinked { user_id, .. }
            | AuthEvent::AccountUnlinked { user_id }
            | AuthEvent::TokenRefreshed { user_id }
            | AuthEvent::TokenRefreshFailed { user_id, .. } => user_id,
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by sync workers and the session registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A worker was launched for the user.
    SessionStarted {
        user_id: String,
        session_id: String,
        /// Playback origin, e.g. `"spotify"` or `"browser"`.
        origin: String,
    },
    /// A now-playing status was published.
    StatusPublished {
        user_id: String,
        session_id: String,
        text: String,
    },
    /// The original status was published back.
    StatusRestored {
        user_id: String,
        session_id: String,
    },
    /// An iteration failed; the worker will retry.
    SyncDegraded {
        user_id: String,
        session_id: String,
        consecutive_errors: u32,
        message: String,
    },
    /// The worker honoured a stop request and exited.
    SessionStopped {
        user_id: String,
        session_id: String,
    },
    /// The worker escalated after repeated failures and exited.
    SessionFailed {
        user_id: String,
        session_id: String,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::SessionStarted { .. } => "Sync session started",
            SyncEvent::StatusPublished { .. } => "Now-playing status published",
            SyncEvent::StatusRestored { .. } => "Original status restored",
            SyncEvent::SyncDegraded { .. } => "Sync iteration failed",
            SyncEvent::SessionStopped { .. } => "Sync session stopped",
            SyncEvent::SessionFailed { .. } => "Sync session failed",
        }
    }

    fn user_id(&self) -> &str {
        match self {
            SyncEvent::SessionStarted { user_id, .. }
            | SyncEvent::StatusPublished { user_id, .. }
            | SyncEvent::StatusRestored { user_id, .. }
            | SyncEvent::SyncDegraded { user_id, .. }
            | SyncEvent::SessionStopped { user_id, .. }
            | SyncEvent::SessionFailed { user_id, .. } => user_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error when nobody is subscribed; callers normally ignore it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
