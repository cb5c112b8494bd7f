//! # Spotify Provider
//!
//! Implements `PlaybackSource` against the Spotify Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Current playback lookup (`GET /v1/me/player`) with a bearer token
//! - Mapping of tracks to name and artist list; podcasts and ads read as
//!   "not playing"
//! - Classification of failures into expired authorization and transient
//!   errors, so the sync worker knows when to refresh the token

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SpotifyConnector;
pub use error::{Result, SpotifyError};
