use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, StoreError, StoredCredentials};
use crate::models::UserProfile;

/// In-memory session state.
///
/// `authenticated` is derived from the token, so a session can never claim
/// to be authenticated without one. A profile only exists alongside a token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    profile: Option<UserProfile>,
}

impl Session {
    /// Get the bearer token if authenticated
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().map(|p| p.is_admin()).unwrap_or(false)
    }
}

/// What `restore` found in the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Token and profile adopted into the session
    Restored,
    /// Nothing stored; session left untouched
    Empty,
    /// Record was unreadable, corrupt or half-populated and has been erased
    Discarded,
}

struct Inner {
    state: Mutex<Session>,
    store: Arc<dyn CredentialStore>,
}

/// Shared handle to the one session of the process.
///
/// Every mutation writes the credential record through before the lock is
/// released, so memory and store never diverge longer than one operation.
/// Clone is cheap and all clones observe the same session.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Inner>,
}

impl SharedSession {
    /// Create an anonymous session backed by `store`
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Session::default()),
                store,
            }),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.state.lock().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.state.lock().await.token.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.state.lock().await.profile.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.state.lock().await.is_authenticated()
    }

    /// Adopt a freshly issued token and profile.
    ///
    /// The record is persisted first; if that fails the session is left as
    /// it was.
    pub async fn establish(&self, token: String, profile: UserProfile) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        let record = StoredCredentials {
            token: Some(token.clone()),
            profile: Some(serde_json::to_string(&profile)?),
        };
        self.inner.store.save(&record)?;
        info!(user = %profile.username, "Session established");
        state.token = Some(token);
        state.profile = Some(profile);
        Ok(())
    }

    /// Replace the profile, but only while the session still holds the token
    /// the profile was fetched with. Returns `false` when the update was
    /// discarded because the session was cleared or re-established meanwhile.
    pub async fn replace_profile(&self, issued_with: &str, profile: UserProfile) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock().await;
        if state.token.as_deref() != Some(issued_with) {
            warn!("Discarding profile fetched for a session that is no longer current");
            return Ok(false);
        }
        let record = StoredCredentials {
            token: state.token.clone(),
            profile: Some(serde_json::to_string(&profile)?),
        };
        self.inner.store.save(&record)?;
        debug!(user = %profile.username, "Profile replaced");
        state.profile = Some(profile);
        Ok(true)
    }

    /// Clear the session and erase the credential record.
    ///
    /// Idempotent. Memory is cleared even if erasing the record fails.
    /// Returns whether the session was authenticated before the call.
    pub async fn clear(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let was_authenticated = self.reset(&mut state);
        if was_authenticated {
            info!("Session cleared");
        }
        was_authenticated
    }

    /// Rehydrate the session from the credential record.
    ///
    /// The lock is held across the read, so a concurrent logout either
    /// completes first (and restore finds nothing) or waits for restore.
    pub async fn restore(&self) -> RestoreOutcome {
        let mut state = self.inner.state.lock().await;
        let record = match self.inner.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Unreadable credential record, logging out");
                self.reset(&mut state);
                return RestoreOutcome::Discarded;
            }
        };

        match (record.token, record.profile) {
            (None, None) => RestoreOutcome::Empty,
            (Some(token), Some(profile)) => match serde_json::from_str::<UserProfile>(&profile) {
                Ok(profile) => {
                    debug!(user = %profile.username, "Session restored");
                    state.token = Some(token);
                    state.profile = Some(profile);
                    RestoreOutcome::Restored
                }
                Err(e) => {
                    warn!(error = %e, "Corrupt stored profile, logging out");
                    self.reset(&mut state);
                    RestoreOutcome::Discarded
                }
            },
            _ => {
                warn!("Half-populated credential record, logging out");
                self.reset(&mut state);
                RestoreOutcome::Discarded
            }
        }
    }

    /// Empty `state` and erase the record. Caller holds the session lock.
    fn reset(&self, state: &mut Session) -> bool {
        let was_authenticated = state.is_authenticated();
        *state = Session::default();
        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "Failed to erase credential record");
        }
        was_authenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::MemoryCredentialStore;
    use chrono::Utc;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: 1,
            username: name.to_string(),
            email: None,
            is_active: true,
            is_superuser: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn shared(store: &Arc<MemoryCredentialStore>) -> SharedSession {
        SharedSession::new(store.clone())
    }

    #[tokio::test]
    async fn test_new_session_is_anonymous() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store).snapshot().await;
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(session.profile(), None);
    }

    #[tokio::test]
    async fn test_establish_writes_through() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store);
        session.establish("tok".into(), profile("alice")).await.expect("establish");

        assert!(session.is_authenticated().await);
        let record = store.snapshot();
        assert_eq!(record.token.as_deref(), Some("tok"));
        let stored: UserProfile = serde_json::from_str(record.profile.as_deref().expect("profile slot"))
            .expect("stored profile parses");
        assert_eq!(stored.username, "alice");
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store);
        session.establish("tok".into(), profile("alice")).await.expect("establish");

        assert!(session.clear().await);
        assert!(!session.clear().await);
        assert!(!session.is_authenticated().await);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_replace_profile_discarded_after_clear() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store);
        session.establish("tok".into(), profile("alice")).await.expect("establish");
        session.clear().await;

        let applied = session.replace_profile("tok", profile("alice-late")).await.expect("replace");
        assert!(!applied);
        assert!(!session.is_authenticated().await);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_replace_profile_discarded_for_other_token() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store);
        session.establish("new-tok".into(), profile("bob")).await.expect("establish");

        let applied = session.replace_profile("old-tok", profile("alice")).await.expect("replace");
        assert!(!applied);
        assert_eq!(session.profile().await.map(|p| p.username), Some("bob".to_string()));
    }

    #[tokio::test]
    async fn test_restore_adopts_valid_record() {
        let store = Arc::new(MemoryCredentialStore::with_record(StoredCredentials {
            token: Some("tok".into()),
            profile: Some(serde_json::to_string(&profile("carol")).expect("serialize")),
        }));
        let session = shared(&store);
        assert_eq!(session.restore().await, RestoreOutcome::Restored);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.token(), Some("tok"));
        assert_eq!(snapshot.profile().map(|p| p.username.as_str()), Some("carol"));
    }

    #[tokio::test]
    async fn test_restore_empty_record() {
        let store = Arc::new(MemoryCredentialStore::default());
        let session = shared(&store);
        assert_eq!(session.restore().await, RestoreOutcome::Empty);
        assert!(!session.is_authenticated().await);
    }

    /// Memory store whose erase blocks for a while, widening the window in
    /// which another operation can queue up behind a logout.
    struct SlowClearStore {
        inner: MemoryCredentialStore,
        delay: std::time::Duration,
    }

    impl CredentialStore for SlowClearStore {
        fn load(&self) -> Result<StoredCredentials, StoreError> {
            self.inner.load()
        }

        fn save(&self, record: &StoredCredentials) -> Result<(), StoreError> {
            self.inner.save(record)
        }

        fn clear(&self) -> Result<(), StoreError> {
            std::thread::sleep(self.delay);
            self.inner.clear()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restore_during_logout_does_not_resurrect_session() {
        let store = Arc::new(SlowClearStore {
            inner: MemoryCredentialStore::default(),
            delay: std::time::Duration::from_millis(300),
        });
        let session = SharedSession::new(store.clone());
        session.establish("tok-1".into(), profile("alice")).await.expect("establish");

        let clearing = {
            let session = session.clone();
            tokio::spawn(async move { session.clear().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let restoring = {
            let session = session.clone();
            tokio::spawn(async move { session.restore().await })
        };

        assert!(clearing.await.expect("clear task"));
        let outcome = restoring.await.expect("restore task");

        assert_eq!(outcome, RestoreOutcome::Empty);
        assert!(!session.is_authenticated().await);
        assert!(store.inner.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_restore_corrupt_profile_is_discarded() {
        let store = Arc::new(MemoryCredentialStore::with_record(StoredCredentials {
            token: Some("tok".into()),
            profile: Some("{not json".into()),
        }));
        let session = shared(&store);
        assert_eq!(session.restore().await, RestoreOutcome::Discarded);
        assert!(!session.is_authenticated().await);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_restore_half_record_is_discarded() {
        let store = Arc::new(MemoryCredentialStore::with_record(StoredCredentials {
            token: Some("tok".into()),
            profile: None,
        }));
        let session = shared(&store);
        assert_eq!(session.restore().await, RestoreOutcome::Discarded);
        assert!(!session.is_authenticated().await);
        assert!(store.snapshot().is_empty());
    }
}
