//! Playback source contract and snapshot types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A track as reported by a playback source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub name: String,
    pub artists: Vec<String>,
}

impl TrackInfo {
    pub fn new<I, S>(name: impl Into<String>, artists: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            artists: artists.into_iter().map(Into::into).collect(),
        }
    }

    /// Comma-joined artist list, or `"Unknown Artist"` when empty.
    pub fn joined_artists(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }
}

/// Playback state sampled by one poll. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub track: Option<TrackInfo>,
}

impl PlaybackSnapshot {
    pub fn playing(track: TrackInfo) -> Self {
        Self {
            is_playing: true,
            track: Some(track),
        }
    }

    pub fn not_playing() -> Self {
        Self::default()
    }

    /// The track that should be advertised, if any.
    ///
    /// A paused player or a player without an item is treated as silent.
    pub fn now_playing(&self) -> Option<&TrackInfo> {
        if self.is_playing {
            self.track.as_ref()
        } else {
            None
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The access token was rejected; a refresh may fix it.
    #[error("Playback access token expired or revoked")]
    AuthExpired,

    /// Network failure, rate limiting, or an unexpected upstream response.
    #[error("Transient playback error: {0}")]
    Transient(String),
}

/// Reports the current playback of a user.
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Sample the current playback.
    ///
    /// Token-based sources ignore `user_id`; push-fed sources ignore
    /// `access_token`.
    async fn current_playback(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<PlaybackSnapshot, PlaybackError>;
}
