use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::ActiveSession;

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Active sessions keyed by the device-issued session id.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, Arc<ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<ActiveSession>) {
        info!("registering session {}", session.session_id());
        self.inner
            .write()
            .insert(session.session_id().to_owned(), session);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.inner.read().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.inner.write().remove(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.read().contains_key(session_id)
    }

    /// All sessions, sorted by id for stable listings.
    pub fn list(&self) -> Vec<Arc<ActiveSession>> {
        let mut sessions: Vec<Arc<ActiveSession>> = self.inner.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id().cmp(b.session_id()));
        sessions
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
