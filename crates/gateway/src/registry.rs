use std::collections::HashMap;

use {
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use parley_protocol::Identity;

use crate::session::{Session, SessionSink};

/// Authenticated sessions keyed by identity id.
///
/// At most one session per id. A second registration for the same id
/// replaces the first without closing it; the replaced connection keeps its
/// socket but no longer receives broadcasts.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity`, returning the session it displaced, if any.
    pub async fn add(&self, identity: Identity, sink: SessionSink) -> Option<Session> {
        let id = identity.id.clone();
        let mut sessions = self.sessions.write().await;
        let replaced = sessions.insert(id.clone(), Session::new(identity, sink));
        if let Some(old) = &replaced {
            warn!(
                user_id = %id,
                old_conn = old.sink.conn_id(),
                "identity registered twice, previous session replaced"
            );
        }
        info!(user_id = %id, total = sessions.len(), "session registered");
        replaced
    }

    /// Remove by id. Idempotent: a second call is a no-op returning `None`.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        match &removed {
            Some(session) => info!(
                user_id = id,
                username = %session.identity.display_name,
                total = sessions.len(),
                "session removed"
            ),
            None => debug!(user_id = id, "session already removed"),
        }
        removed
    }

    /// Visit every session except `excluded` under a single read guard.
    ///
    /// `f` must not call back into the registry. Returns the number of
    /// sessions visited.
    pub async fn for_each_except<F>(&self, excluded: &str, mut f: F) -> usize
    where
        F: FnMut(&Session),
    {
        let sessions = self.sessions.read().await;
        let mut visited = 0;
        for session in sessions.values().filter(|s| s.id() != excluded) {
            f(session);
            visited += 1;
        }
        visited
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Registered ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
