//! Spotify Web API response types
//!
//! Only the fields the sync engine reads are modelled.

use serde::Deserialize;

/// `GET /v1/me/player` response
///
/// See: https://developer.spotify.com/documentation/web-api/reference/get-information-about-the-users-current-playback
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub is_playing: bool,

    /// `track`, `episode`, `ad` or `unknown`
    #[serde(default)]
    pub currently_playing_type: Option<String>,

    /// Currently playing item; absent during ads and private sessions
    #[serde(default)]
    pub item: Option<PlayingItem>,
}

/// Track or episode object
#[derive(Debug, Clone, Deserialize)]
pub struct PlayingItem {
    pub name: String,

    /// `track` or `episode`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Empty for episodes
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl PlayingItem {
    pub fn is_track(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "track")
    }
}

/// Simplified artist object
#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// Regular error object
///
/// See: https://developer.spotify.com/documentation/web-api/concepts/api-calls#regular-error-object
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}
