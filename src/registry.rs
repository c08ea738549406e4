//! Session registry
//!
//! The set of live sessions, shared by every connection supervisor.
//!
//! # Critical section
//! The lock covers membership only: `add`, `remove` and taking a snapshot
//! for iteration. Work done per session in `for_each_except` runs after the
//! lock is released, so a slow target never blocks unrelated add/remove.
//! A session removed while a snapshot is being walked is still visited
//! exactly once; its sink reports the closure if the writer has gone.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::session::Session;
use crate::types::SessionId;

/// Concurrency-safe set of live sessions
///
/// Cheap to clone; all clones share the same membership.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    ///
    /// Fails only if a session with the same identity is already present.
    pub fn add(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(RegistryError::DuplicateSession(session.id));
        }
        sessions.insert(session.id, session);
        debug!("Total sessions: {}", sessions.len());
        Ok(())
    }

    /// Unregister a session
    ///
    /// Idempotent: removing an absent session is a no-op. Returns the
    /// removed session, if it was present.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&id);
        if removed.is_some() {
            debug!("Total sessions: {}", sessions.len());
        }
        removed
    }

    /// Snapshot of every registered session except `excluded`
    pub fn snapshot_except(&self, excluded: SessionId) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.id != excluded)
            .cloned()
            .collect()
    }

    /// Apply `f` to every registered session except `excluded`
    ///
    /// Iterates a snapshot taken under the lock; `f` runs without it.
    pub fn for_each_except<F>(&self, excluded: SessionId, mut f: F)
    where
        F: FnMut(&Arc<Session>),
    {
        for session in self.snapshot_except(excluded) {
            f(&session);
        }
    }

    /// Check if a session is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Display names of sessions that have completed the handshake
    pub fn names(&self) -> Vec<String> {
        self.sessions
            .read()
            .values()
            .filter_map(|s| s.name().map(str::to_owned))
            .collect()
    }
}
