//! Linked-account persistence
//!
//! One JSON record per user under `linked_accounts:<user_id>` in the
//! injected [`KeyValueStore`]. Token values are never logged; only the user
//! id and which services are linked appear in log fields.

use crate::error::{AuthError, Result};
use crate::types::{LinkedAccounts, UserId};
use bridge_traits::storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "linked_accounts:";

#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(user_id: &UserId) -> String {
        format!("{}{}", KEY_PREFIX, user_id)
    }

    /// Load the record of `user_id`.
    ///
    /// A record that no longer deserializes is deleted and reported as
    /// [`AuthError::AccountCorrupted`]; the user has to link again.
    pub async fn load(&self, user_id: &UserId) -> Result<Option<LinkedAccounts>> {
        let key = Self::storage_key(user_id);

        let raw = self.store.get(&key).await.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Failed to read linked accounts");
            AuthError::StorageUnavailable(e.to_string())
        })?;

        let Some(raw) = raw else {
            debug!(user_id = %user_id, "No linked accounts stored");
            return Ok(None);
        };

        match serde_json::from_str::<LinkedAccounts>(&raw) {
            Ok(accounts) => Ok(Some(accounts)),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Linked accounts record is corrupted, deleting it"
                );

                if let Err(delete_err) = self.store.delete(&key).await {
                    warn!(
                        user_id = %user_id,
                        error = %delete_err,
                        "Failed to delete corrupted linked accounts"
                    );
                }

                Err(AuthError::AccountCorrupted {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Persist the record, or remove it when nothing is linked any more.
    pub async fn save(&self, user_id: &UserId, accounts: &LinkedAccounts) -> Result<()> {
        let key = Self::storage_key(user_id);

        if accounts.is_empty() {
            return self.delete(user_id).await;
        }

        let json = serde_json::to_string(accounts)
            .map_err(|e| AuthError::StorageUnavailable(format!("serialization failed: {}", e)))?;

        self.store.set(&key, &json).await.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Failed to persist linked accounts");
            AuthError::StorageUnavailable(e.to_string())
        })?;

        debug!(
            user_id = %user_id,
            messaging = accounts.messaging.is_some(),
            playback = accounts.playback.is_some(),
            "Persisted linked accounts"
        );
        Ok(())
    }

    pub async fn delete(&self, user_id: &UserId) -> Result<()> {
        self.store
            .delete(&Self::storage_key(user_id))
            .await
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))
    }

    /// Users that have at least one linked account.
    pub async fn list_users(&self) -> Result<Vec<UserId>> {
        let keys = self
            .store
            .list_keys(KEY_PREFIX)
            .await
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;

        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .filter_map(|id| UserId::new(id).ok())
            .collect())
    }
}
