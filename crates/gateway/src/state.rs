use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {tokio_util::task::TaskTracker, tracing::info};

use parley_auth::AuthGateway;

use crate::{broadcast::BroadcastEngine, history::MessageHistory, registry::ConnectionRegistry};

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
///
/// Every collaborator is injected here so tests can build isolated gateways.
pub struct GatewayState {
    /// Authenticated sessions, keyed by identity id.
    pub registry: Arc<ConnectionRegistry>,
    /// Recent chat messages.
    pub history: MessageHistory,
    pub broadcaster: BroadcastEngine,
    /// Identity backend.
    pub auth: Arc<dyn AuthGateway>,
    /// Server version string.
    pub version: String,
    /// Live WebSocket connection tasks, drained on shutdown.
    pub connections: TaskTracker,
    conn_seq: AtomicU64,
}

impl GatewayState {
    pub fn new(auth: Arc<dyn AuthGateway>, history_capacity: usize) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        Arc::new(Self {
            broadcaster: BroadcastEngine::new(Arc::clone(&registry)),
            registry,
            history: MessageHistory::new(history_capacity),
            auth,
            version: env!("CARGO_PKG_VERSION").to_string(),
            connections: TaskTracker::new(),
            conn_seq: AtomicU64::new(0),
        })
    }

    /// Allocate a connection id for logging (`conn-1`, `conn-2`, ...).
    pub fn next_conn_id(&self) -> String {
        let n = self.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("conn-{n}")
    }

    /// Stop accepting new connection tasks and wait for the open ones to end.
    pub async fn drain_connections(&self) {
        self.connections.close();
        if !self.connections.is_empty() {
            info!(
                open = self.connections.len(),
                "waiting for chat sessions to close"
            );
        }
        self.connections.wait().await;
    }
}
