//! # Desktop Bridge Implementations
//!
//! Concrete adapters for the infrastructure traits in `bridge-traits`:
//!
//! - [`ReqwestHttpClient`] - pooled rustls client with per-request timeouts
//! - [`SqliteKeyValueStore`] - SQLite-backed key/value persistence
//!
//! The service binary wires these into the credential manager and the
//! playback/messaging connectors.

mod http;
mod kv_store;

pub use http::ReqwestHttpClient;
pub use kv_store::SqliteKeyValueStore;
