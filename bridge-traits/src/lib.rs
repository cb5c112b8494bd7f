//! # Host Bridge Traits
//!
//! Contracts between the status sync core and the services it talks to.
//!
//! ## Overview
//!
//! The sync engine never speaks HTTP or SQL directly. Every capability it
//! needs is expressed as a trait in this crate and injected as
//! `Arc<dyn Trait>`, so the engine can be driven by real adapters in
//! production and by scripted fakes in tests.
//!
//! ## Traits
//!
//! ### Collaborators of the sync engine
//! - [`CredentialSource`](credentials::CredentialSource) - Linked tokens per user, refresh on expiry
//! - [`PlaybackSource`](playback::PlaybackSource) - Current playback snapshot for a user
//! - [`StatusPublisher`](status::StatusPublisher) - Read and write the messaging status
//!
//! ### Infrastructure
//! - [`HttpClient`](http::HttpClient) - Async HTTP with per-request timeouts
//! - [`KeyValueStore`](storage::KeyValueStore) - String key/value persistence
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! Infrastructure traits use [`BridgeError`](error::BridgeError). Collaborator
//! traits return small, purpose-built error enums instead, because the sync
//! worker classifies failures (expired authorization, rate limiting, transient
//! faults) and needs that distinction preserved across the boundary.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across worker tasks.

pub mod credentials;
pub mod error;
pub mod http;
pub mod playback;
pub mod status;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use credentials::{CredentialError, CredentialSource, LinkedTokens};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playback::{PlaybackError, PlaybackSnapshot, PlaybackSource, TrackInfo};
pub use status::{MessagingStatus, PublishError, StatusPublisher};
pub use storage::KeyValueStore;
pub use time::{Clock, LogLevel, SystemClock};
