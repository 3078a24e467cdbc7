//! Session storage keyed by session id.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::SessionState;

/// Shared, lockable session. Holding the lock serializes passes for one session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
/// Each session sits behind its own async mutex, so different sessions never
/// wait on each other.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    /// `None` keeps idle sessions forever.
    idle_timeout: Option<Duration>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store that never expires sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_timeout(None)
    }

    /// Create a store whose idle sessions are swept after `idle_timeout`.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                idle_timeout,
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new session and return its id and handle.
    ///
    /// Sweeps idle sessions first when an idle timeout is configured.
    #[must_use]
    pub fn create(&self) -> (String, SessionHandle) {
        self.sweep_idle();

        let id = Uuid::new_v4().to_string();
        let handle = self.create_with_id(&id);
        tracing::info!(name: "session.created", session_id = %id, "Session created");
        (id, handle)
    }

    fn sweep_idle(&self) {
        if let Some(timeout) = self.inner.idle_timeout {
            let removed = self.cleanup_expired_with_timeout(timeout);
            if removed > 0 {
                tracing::info!(removed = removed, "Expired idle sessions");
            }
        }
    }

    fn create_with_id(&self, id: &str) -> SessionHandle {
        let handle = Arc::new(Mutex::new(SessionState::new(id)));
        self.write().insert(id.to_string(), Arc::clone(&handle));
        handle
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.read().get(id).cloned()
    }

    /// Get a session by ID, creating it if it doesn't exist.
    ///
    /// A miss sweeps idle sessions before inserting, like [`Self::create`].
    #[must_use]
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.get(id) {
            return handle;
        }
        self.sweep_idle();
        // Re-check under the write lock so two callers agree on one session.
        let mut guard = self.write();
        Arc::clone(
            guard
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(id)))),
        )
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            tracing::info!(name: "session.removed", session_id = %id, "Session removed");
        }
        removed
    }

    /// Get the number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Sessions locked by a running pass are in use and never removed.
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, handle| {
            handle
                .try_lock()
                .map_or(true, |session| !session.is_expired_with_timeout(timeout))
        });
        before - guard.len()
    }

    /// List all session IDs.
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
