//! # Status Sync Engine
//!
//! Keeps a user's messaging status in step with what they are listening to.
//!
//! ## Overview
//!
//! - [`SessionRegistry`] owns one [`Session`] per user and at most one live
//!   worker per user
//! - The worker polls a [`PlaybackSource`](bridge_traits::PlaybackSource),
//!   publishes `Listening to: <track> – <artists>` through a
//!   [`StatusPublisher`](bridge_traits::StatusPublisher) when the text
//!   changes, and restores the original status when playback stops
//! - [`BackoffPolicy`] decides between refreshing credentials, backing off
//!   and giving up
//! - [`ReportedPlaybackSource`] serves snapshots pushed by the browser
//!   extension
//!
//! Sessions emit [`SyncEvent`](core_runtime::events::SyncEvent)s on the
//! shared event bus as they start, publish, degrade and end.

pub mod error;
pub mod policy;
pub mod registry;
pub mod reported;
pub mod session;
mod worker;

pub use error::{Result, SyncError};
pub use policy::{BackoffPolicy, Decision, ErrorKind};
pub use registry::SessionRegistry;
pub use reported::ReportedPlaybackSource;
pub use session::{PlaybackOrigin, Session, SessionId, SessionState};
pub use worker::{now_playing_status, NOW_PLAYING_ICON};
