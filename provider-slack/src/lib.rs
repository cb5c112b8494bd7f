//! # Slack Provider
//!
//! Implements `StatusPublisher` against the Slack Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Profile status lookup (`users.profile.get`)
//! - Status updates without expiry (`users.profile.set`)
//! - Translation of Slack's `ok: false` envelopes into rate limiting,
//!   expired authorization, or plain failures

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SlackConnector;
pub use error::{Result, SlackError};
