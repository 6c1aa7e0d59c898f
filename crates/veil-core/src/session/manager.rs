//! Session Manager for multi-session orchestration
//!
//! Owns one `Session` per id. Turns for the same session run one at a time;
//! different sessions run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::orchestrator::Session;
use super::types::{SessionId, TurnOutcome};
use crate::config::{RedactionConfig, StoreScope};
use crate::error::Result;
use crate::redaction::{RedactionCodec, RedactionStore};

/// Builds a session around the codec chosen by the manager
pub type SessionFactory = Arc<dyn Fn(RedactionCodec) -> Session + Send + Sync>;

/// Manages multiple concurrent sessions
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>>,
    factory: SessionFactory,
    redaction: RedactionConfig,
    /// The shared store when the scope is `Process`
    process_store: Option<RedactionStore>,
}

impl SessionManager {
    /// Create a manager. `factory` is called once per new session id.
    pub fn new<F>(redaction: RedactionConfig, factory: F) -> Self
    where
        F: Fn(RedactionCodec) -> Session + Send + Sync + 'static,
    {
        let process_store = match redaction.scope {
            StoreScope::Process => Some(RedactionStore::new()),
            StoreScope::Session => None,
        };

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            factory: Arc::new(factory),
            redaction,
            process_store,
        }
    }

    pub fn scope(&self) -> StoreScope {
        self.redaction.scope
    }

    /// Process-wide store, if the scope is `Process`
    pub fn process_store(&self) -> Option<&RedactionStore> {
        self.process_store.as_ref()
    }

    /// Get a session, creating it on first use
    pub async fn session(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("Creating new session: {}", session_id);
                let store = self.process_store.clone().unwrap_or_default();
                let codec = RedactionCodec::new(store, self.redaction.salt.clone());
                let session = (self.factory)(codec).with_id(session_id);
                Arc::new(Mutex::new(session))
            })
            .clone()
    }

    /// Run a turn on a session, waiting for any turn already running there
    pub async fn run_turn(&self, session_id: &str, query: &str) -> Result<TurnOutcome> {
        self.run_turn_with_cancel(session_id, query, CancellationToken::new())
            .await
    }

    pub async fn run_turn_with_cancel(
        &self,
        session_id: &str,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let session = self.session(session_id).await;
        let mut session = session.lock().await;
        session.run_turn_with_cancel(query, cancel).await
    }

    /// Clear a session's history. With a per-session store the store is
    /// emptied too; a process-wide store is left alone.
    pub async fn reset_session(&self, session_id: &str) {
        let Some(session) = self.sessions.read().await.get(session_id).cloned() else {
            return;
        };

        let mut session = session.lock().await;
        match self.redaction.scope {
            StoreScope::Session => session.reset(),
            StoreScope::Process => session.clear_history(),
        }
        debug!("Reset session: {}", session_id);
    }

    /// Drop a session
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            info!("Removed session: {}", session_id);
        }
        removed
    }

    pub async fn list_sessions(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
