//! Key/value persistence abstraction.
//!
//! Linked-account records are stored as JSON strings under namespaced keys
//! (for example `linked_accounts:<user_id>`). Implementations only need to
//! provide atomic single-key operations.

use async_trait::async_trait;

use crate::error::Result;

/// String key/value store.
///
/// Values may contain credentials. Implementations must not log them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. Returns `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys starting with `prefix`, in ascending order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
