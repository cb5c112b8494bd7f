//! # Linked Accounts & Credentials
//!
//! Persists the messaging and playback tokens a user linked, and keeps the
//! playback access token fresh.
//!
//! - [`AccountStore`] - JSON records in a [`KeyValueStore`](bridge_traits::KeyValueStore)
//! - [`OAuthRefresher`] - refresh-token grant against the playback token endpoint
//! - [`CredentialManager`] - the [`CredentialSource`](bridge_traits::CredentialSource)
//!   used by sync workers
//!
//! Obtaining the initial tokens (the OAuth redirect dance) happens outside
//! this crate; callers hand finished tokens to
//! [`CredentialManager::link_messaging`] and [`CredentialManager::link_playback`].

pub mod account_store;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod types;

pub use account_store::AccountStore;
pub use error::{AuthError, Result};
pub use manager::CredentialManager;
pub use oauth::{OAuthRefresher, RefreshedToken, TokenRefresher};
pub use types::{LinkedAccounts, LinkedService, MessagingLink, PlaybackLink, UserId};
