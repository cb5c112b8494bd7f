//! Credential manager
//!
//! Links and unlinks accounts, and serves tokens to sync workers through the
//! [`CredentialSource`] contract. Refreshes are serialised per user so that a
//! superseded worker and its replacement never race two refresh grants.

use crate::account_store::AccountStore;
use crate::error::{AuthError, Result};
use crate::oauth::TokenRefresher;
use crate::types::{LinkedAccounts, LinkedService, MessagingLink, PlaybackLink, UserId};
use async_trait::async_trait;
use bridge_traits::credentials::{CredentialError, CredentialSource, LinkedTokens};
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub struct CredentialManager {
    accounts: AccountStore,
    refresher: Option<Arc<dyn TokenRefresher>>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    refresh_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    /// Create a manager. Without a refresher, expired playback tokens can
    /// only be replaced by linking again.
    pub fn new(
        accounts: AccountStore,
        refresher: Option<Arc<dyn TokenRefresher>>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            refresher,
            event_bus,
            clock,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current record of `user_id` (empty when nothing is linked).
    pub async fn linked_accounts(&self, user_id: &UserId) -> Result<LinkedAccounts> {
        Ok(self.accounts.load(user_id).await?.unwrap_or_default())
    }

    /// Store or replace the messaging-service token.
    #[instrument(skip(self, access_token), fields(user_id = %user_id))]
    pub async fn link_messaging(&self, user_id: &UserId, access_token: &str) -> Result<()> {
        let access_token = non_empty(access_token, "messaging access token")?;

        let mut accounts = self.linked_accounts(user_id).await?;
        accounts.messaging = Some(MessagingLink {
            access_token,
            linked_at: self.clock.now(),
        });
        self.accounts.save(user_id, &accounts).await?;

        info!("Linked messaging account");
        self.emit_linked(user_id, LinkedService::Messaging);
        Ok(())
    }

    /// Store or replace the playback-service tokens.
    #[instrument(skip(self, access_token, refresh_token), fields(user_id = %user_id))]
    pub async fn link_playback(
        &self,
        user_id: &UserId,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        let access_token = non_empty(access_token, "playback access token")?;
        let refresh_token = refresh_token
            .map(|token| non_empty(token, "playback refresh token"))
            .transpose()?;

        let mut accounts = self.linked_accounts(user_id).await?;
        accounts.playback = Some(PlaybackLink {
            access_token,
            refresh_token,
            linked_at: self.clock.now(),
            refreshed_at: None,
        });
        self.accounts.save(user_id, &accounts).await?;

        info!("Linked playback account");
        self.emit_linked(user_id, LinkedService::Playback);
        Ok(())
    }

    /// Forget every linked account of `user_id`. Unknown users are a no-op.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn unlink(&self, user_id: &UserId) -> Result<()> {
        self.accounts.delete(user_id).await?;
        self.refresh_locks.lock().await.remove(user_id);

        info!("Unlinked accounts");
        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::AccountUnlinked {
                user_id: user_id.to_string(),
            }))
            .ok();
        Ok(())
    }

    /// Run the refresh grant and persist the outcome.
    #[instrument(skip(self, refresh_token), fields(user_id = %user_id))]
    pub async fn refresh_playback_token(
        &self,
        user_id: &UserId,
        refresh_token: &str,
    ) -> Result<String> {
        let refresher = self.refresher.as_ref().ok_or(AuthError::RefreshUnavailable)?;

        let lock = {
            let mut locks = self.refresh_locks.lock().await;
            locks
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let mut accounts = self.linked_accounts(user_id).await?;
        let Some(playback) = accounts.playback.as_mut() else {
            return Err(AuthError::NotLinked {
                user_id: user_id.to_string(),
                service: LinkedService::Playback.to_string(),
            });
        };

        // A concurrent refresh may already have rotated the refresh token.
        let grant = playback
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_string());

        let refreshed = match refresher.refresh_access_token(&grant).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "Playback token refresh failed");
                self.event_bus
                    .emit(CoreEvent::Auth(AuthEvent::TokenRefreshFailed {
                        user_id: user_id.to_string(),
                        message: e.to_string(),
                    }))
                    .ok();
                return Err(e);
            }
        };

        playback.access_token = refreshed.access_token.clone();
        if let Some(rotated) = refreshed.refresh_token {
            debug!("Refresh token rotated");
            playback.refresh_token = Some(rotated);
        }
        playback.refreshed_at = Some(self.clock.now());
        self.accounts.save(user_id, &accounts).await?;

        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                user_id: user_id.to_string(),
            }))
            .ok();

        Ok(refreshed.access_token)
    }

    fn emit_linked(&self, user_id: &UserId, service: LinkedService) {
        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::AccountLinked {
                user_id: user_id.to_string(),
                service: service.to_string(),
            }))
            .ok();
    }
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AuthError::InvalidToken(format!("{} is empty", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

#[async_trait]
impl CredentialSource for CredentialManager {
    async fn get_tokens(&self, user_id: &str) -> std::result::Result<LinkedTokens, CredentialError> {
        let user_id = UserId::new(user_id)?;
        match self.accounts.load(&user_id).await? {
            Some(accounts) if !accounts.is_empty() => Ok(accounts.to_tokens()),
            _ => Err(CredentialError::NotLinked(user_id.to_string())),
        }
    }

    async fn refresh(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> std::result::Result<String, CredentialError> {
        let user_id = UserId::new(user_id)?;
        Ok(self.refresh_playback_token(&user_id, refresh_token).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::RefreshedToken;
    use bridge_desktop::SqliteKeyValueStore;
    use bridge_traits::time::SystemClock;
    use mockall::mock;

    mock! {
        Refresher {}

        #[async_trait]
        impl TokenRefresher for Refresher {
            async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;
        }
    }

    async fn manager(refresher: Option<MockRefresher>) -> (CredentialManager, EventBus) {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();
        let bus = EventBus::new(16);
        let manager = CredentialManager::new(
            AccountStore::new(Arc::new(store)),
            refresher.map(|r| Arc::new(r) as Arc<dyn TokenRefresher>),
            bus.clone(),
            Arc::new(SystemClock),
        );
        (manager, bus)
    }

    fn user() -> UserId {
        UserId::new("U1").unwrap()
    }

    #[tokio::test]
    async fn test_get_tokens_for_unknown_user_is_not_linked() {
        let (manager, _) = manager(None).await;

        let result = manager.get_tokens("U1").await;
        assert_eq!(result, Err(CredentialError::NotLinked("U1".to_string())));
    }

    #[tokio::test]
    async fn test_link_both_services() {
        let (manager, bus) = manager(None).await;
        let mut events = bus.subscribe();

        manager.link_messaging(&user(), "xoxp-1").await.unwrap();
        manager
            .link_playback(&user(), "BQD-1", Some("AQD-1"))
            .await
            .unwrap();

        let tokens = manager.get_tokens("U1").await.unwrap();
        assert_eq!(tokens.messaging_token.as_deref(), Some("xoxp-1"));
        assert_eq!(tokens.playback_access_token.as_deref(), Some("BQD-1"));
        assert_eq!(tokens.playback_refresh_token.as_deref(), Some("AQD-1"));

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::AccountLinked {
                user_id: "U1".to_string(),
                service: "messaging".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let (manager, _) = manager(None).await;
        assert!(matches!(
            manager.link_messaging(&user(), "  ").await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_persists_new_token() {
        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh_access_token()
            .withf(|token| token == "AQD-1")
            .times(1)
            .returning(|_| {
                Ok(RefreshedToken {
                    access_token: "BQD-2".to_string(),
                    refresh_token: Some("AQD-2".to_string()),
                    expires_in: 3600,
                })
            });

        let (manager, bus) = manager(Some(refresher)).await;
        manager
            .link_playback(&user(), "BQD-1", Some("AQD-1"))
            .await
            .unwrap();
        let mut events = bus.subscribe();

        let token = manager.refresh("U1", "AQD-1").await.unwrap();
        assert_eq!(token, "BQD-2");

        let stored = manager.linked_accounts(&user()).await.unwrap();
        let playback = stored.playback.unwrap();
        assert_eq!(playback.access_token, "BQD-2");
        assert_eq!(playback.refresh_token.as_deref(), Some("AQD-2"));
        assert!(playback.refreshed_at.is_some());

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed {
                user_id: "U1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_maps_to_refresh_failed() {
        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh_access_token()
            .times(1)
            .returning(|_| Err(AuthError::TokenRefreshFailed("invalid_grant".to_string())));

        let (manager, _) = manager(Some(refresher)).await;
        manager
            .link_playback(&user(), "BQD-1", Some("AQD-1"))
            .await
            .unwrap();

        let result = manager.refresh("U1", "AQD-1").await;
        assert!(matches!(result, Err(CredentialError::RefreshFailed(_))));

        let stored = manager.linked_accounts(&user()).await.unwrap();
        assert_eq!(stored.playback.unwrap().access_token, "BQD-1");
    }

    #[tokio::test]
    async fn test_refresh_without_refresher_fails() {
        let (manager, _) = manager(None).await;
        manager
            .link_playback(&user(), "BQD-1", Some("AQD-1"))
            .await
            .unwrap();

        assert!(matches!(
            manager.refresh("U1", "AQD-1").await,
            Err(CredentialError::RefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unlink_removes_everything() {
        let (manager, _) = manager(None).await;
        manager.link_messaging(&user(), "xoxp-1").await.unwrap();

        manager.unlink(&user()).await.unwrap();

        assert!(manager.linked_accounts(&user()).await.unwrap().is_empty());
        assert!(manager.get_tokens("U1").await.is_err());
    }
}
