//! Credential session backed by the secure store.

use crate::{SessionError, SessionResult};
use delivery_storage::{SecureStorage, StorageError, StorageKeys};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct SessionState {
    unlocked: bool,
    auth_token: Option<String>,
}

/// Username, password, and auth token of the participant.
///
/// Nothing is readable or writable until [`CredentialSession::set_unlocked`]
/// delivers the unlock signal. One lock serializes every store access and
/// guards the cached token.
pub struct CredentialSession {
    store: Arc<dyn SecureStorage>,
    state: Mutex<SessionState>,
}

impl CredentialSession {
    pub fn new(store: Arc<dyn SecureStorage>) -> Self {
        Self {
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Record the unlock signal. Returns whether the session is now unlocked.
    pub async fn set_unlocked(&self, unlocked: bool) -> bool {
        let mut state = self.state.lock().await;
        state.unlocked = unlocked;
        if unlocked {
            let _ = self.resolve_token(&mut state);
        } else {
            state.auth_token = None;
        }
        info!(unlocked, "Credential store lock state changed");
        unlocked
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.lock().await.unlocked
    }

    /// Both username and password are stored.
    pub async fn has_credentials(&self) -> bool {
        let state = self.state.lock().await;
        if !state.unlocked {
            return false;
        }
        self.has_key(StorageKeys::USERNAME) && self.has_key(StorageKeys::PASSWORD)
    }

    /// A non-empty auth token is resolvable.
    pub async fn is_signed_in(&self) -> bool {
        self.auth_token().await.is_some()
    }

    pub async fn auth_token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        self.resolve_token(&mut state)
    }

    pub async fn username(&self) -> Option<String> {
        self.read_string(StorageKeys::USERNAME).await
    }

    pub async fn password(&self) -> Option<String> {
        self.read_string(StorageKeys::PASSWORD).await
    }

    /// Store username and password together.
    ///
    /// If the password write fails the username is restored to its previous
    /// value, so readers never observe only one of the pair.
    pub async fn set_credentials(&self, username: &str, password: &str) -> SessionResult<()> {
        let state = self.state.lock().await;
        if !state.unlocked {
            return Err(SessionError::Locked);
        }

        let previous_username = self.store.get(StorageKeys::USERNAME)?;
        self.store.set_string(StorageKeys::USERNAME, username)?;

        if let Err(e) = self.store.set_string(StorageKeys::PASSWORD, password) {
            let rollback = match previous_username {
                Some(previous) => self.store.set(StorageKeys::USERNAME, &previous),
                None => self.store.delete(StorageKeys::USERNAME).map(|_| ()),
            };
            if let Err(rollback_err) = rollback {
                warn!(
                    error = %rollback_err,
                    "Failed to roll back username after password write failed"
                );
            }
            return Err(e.into());
        }

        debug!(username = %username, "Credentials stored");
        Ok(())
    }

    /// Persist a new auth token and cache it.
    pub async fn set_auth_token(&self, token: &str) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        if !state.unlocked {
            return Err(SessionError::Locked);
        }
        self.store.set_string(StorageKeys::AUTHENTICATION_TOKEN, token)?;
        state.auth_token = Some(token.to_string());
        Ok(())
    }

    /// Remove every credential and reset the cache.
    ///
    /// Works while locked. Every key is attempted; the first failure is
    /// returned.
    pub async fn clear(&self) -> SessionResult<()> {
        let mut state = self.state.lock().await;
        state.auth_token = None;

        let mut first_error: Option<StorageError> = None;
        for key in StorageKeys::ALL {
            if let Err(e) = self.store.delete(key) {
                warn!(key, error = %e, "Failed to delete credential");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!("Credential session cleared");
                Ok(())
            }
        }
    }

    fn resolve_token(&self, state: &mut SessionState) -> Option<String> {
        if !state.unlocked {
            return None;
        }
        if let Some(token) = state.auth_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }

        match self.store.get_string(StorageKeys::AUTHENTICATION_TOKEN) {
            Ok(token) => {
                state.auth_token = token.filter(|t| !t.is_empty());
                state.auth_token.clone()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read auth token");
                None
            }
        }
    }

    fn has_key(&self, key: &str) -> bool {
        self.store.has(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Failed to query secure store");
            false
        })
    }

    async fn read_string(&self, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        if !state.unlocked {
            return None;
        }
        self.store.get_string(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "Failed to read credential");
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_storage::MemoryStorage;

    fn session() -> (Arc<MemoryStorage>, CredentialSession) {
        let store = Arc::new(MemoryStorage::new());
        let session = CredentialSession::new(store.clone());
        (store, session)
    }

    #[tokio::test]
    async fn test_locked_session_hides_stored_values() {
        let (store, session) = session();
        store.set_string(StorageKeys::AUTHENTICATION_TOKEN, "tok").unwrap();
        store.set_string(StorageKeys::USERNAME, "alice").unwrap();
        store.set_string(StorageKeys::PASSWORD, "pw").unwrap();

        assert!(!session.is_unlocked().await);
        assert!(!session.is_signed_in().await);
        assert!(!session.has_credentials().await);
        assert_eq!(session.username().await, None);

        assert!(session.set_unlocked(true).await);
        assert!(session.is_signed_in().await);
        assert!(session.has_credentials().await);
        assert_eq!(session.username().await.as_deref(), Some("alice"));
        assert_eq!(session.password().await.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn test_writes_rejected_while_locked() {
        let (store, session) = session();

        assert!(matches!(
            session.set_auth_token("tok").await,
            Err(SessionError::Locked)
        ));
        assert!(matches!(
            session.set_credentials("alice", "pw").await,
            Err(SessionError::Locked)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_token_is_not_signed_in() {
        let (store, session) = session();
        store.set_string(StorageKeys::AUTHENTICATION_TOKEN, "").unwrap();
        session.set_unlocked(true).await;

        assert!(!session.is_signed_in().await);
        assert_eq!(session.auth_token().await, None);
    }

    #[tokio::test]
    async fn test_token_is_cached_and_persisted() {
        let (store, session) = session();
        session.set_unlocked(true).await;

        session.set_auth_token("fresh").await.unwrap();
        assert_eq!(session.auth_token().await.as_deref(), Some("fresh"));
        assert_eq!(
            store.get_string(StorageKeys::AUTHENTICATION_TOKEN).unwrap().as_deref(),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn test_relock_drops_cached_token() {
        let (_store, session) = session();
        session.set_unlocked(true).await;
        session.set_auth_token("tok").await.unwrap();

        session.set_unlocked(false).await;
        assert!(!session.is_signed_in().await);

        session.set_unlocked(true).await;
        assert!(session.is_signed_in().await);
    }

    #[tokio::test]
    async fn test_set_credentials_rolls_back_username() {
        let (store, session) = session();
        session.set_unlocked(true).await;
        store.fail_writes_for(StorageKeys::PASSWORD);

        let result = session.set_credentials("alice", "pw").await;
        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert!(!store.has(StorageKeys::USERNAME).unwrap());
        assert!(!session.has_credentials().await);
    }

    #[tokio::test]
    async fn test_set_credentials_rollback_restores_previous_username() {
        let (store, session) = session();
        session.set_unlocked(true).await;
        session.set_credentials("alice", "pw").await.unwrap();

        store.fail_writes_for(StorageKeys::PASSWORD);
        assert!(session.set_credentials("bob", "pw2").await.is_err());

        assert_eq!(session.username().await.as_deref(), Some("alice"));
        assert_eq!(session.password().await.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn test_clear_removes_everything_even_when_locked() {
        let (store, session) = session();
        session.set_unlocked(true).await;
        session.set_credentials("alice", "pw").await.unwrap();
        session.set_auth_token("tok").await.unwrap();

        session.set_unlocked(false).await;
        session.clear().await.unwrap();
        assert!(store.is_empty());

        session.set_unlocked(true).await;
        assert!(!session.is_signed_in().await);
        assert!(!session.has_credentials().await);

        session.clear().await.unwrap();
    }
}
