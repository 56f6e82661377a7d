//! The session registry.
//!
//! A plain keyed map from derived session id to session handle. The registry
//! is owned by its [`crate::SessionManager`] instance rather than living in
//! process-global state, so isolated instances can coexist (and be tested)
//! freely. Enumeration hands out a point-in-time snapshot; the sweeper can
//! delete entries while iterating without skipping or revisiting anything.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ProxyError, Result};
use crate::session::{derive_id, Session, SessionOptions};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session for `group`. A fresh instance id is generated
    /// when the caller does not supply one. Fails with
    /// [`ProxyError::Conflict`] if the derived id is already registered.
    pub async fn register(
        &self,
        group: &str,
        instance_id: Option<String>,
        options: SessionOptions,
    ) -> Result<Arc<Session>> {
        let instance_id = instance_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let id = derive_id(group, &instance_id);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(ProxyError::Conflict(id));
        }
        let session = Arc::new(Session::new(group, &instance_id, options));
        sessions.insert(id, Arc::clone(&session));
        debug!(consumer = %session.id, "session registered");
        Ok(session)
    }

    /// O(1) lookup by group/instance pair. No side effects.
    pub async fn lookup(&self, group: &str, instance_id: &str) -> Option<Arc<Session>> {
        self.get(&derive_id(group, instance_id)).await
    }

    /// O(1) lookup by derived id.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove the entry unconditionally, returning it if present. Closing
    /// the session's binding is the caller's responsibility.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            debug!(consumer = %id, "session removed from registry");
        }
        removed
    }

    /// Point-in-time snapshot of all sessions, safe to iterate while
    /// entries are being removed.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
