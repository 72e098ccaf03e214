use std::sync::Arc;

use tracing::{debug, warn};

use parley_protocol::ChatResponse;

use crate::registry::ConnectionRegistry;

/// Delivery counts for one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans a response out to every registered session but one.
#[derive(Debug, Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize `response` once and push it to everyone except `excluded`.
    pub async fn broadcast(&self, response: &ChatResponse, excluded: &str) -> BroadcastReport {
        match response.to_frame() {
            Ok(frame) => self.broadcast_frame(&frame, excluded).await,
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast");
                BroadcastReport::default()
            },
        }
    }

    /// Push a serialized frame. A recipient whose sink is closed is evicted
    /// on a separate task, since the registry read guard is held here.
    pub async fn broadcast_frame(&self, frame: &str, excluded: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        self.registry
            .for_each_except(excluded, |session| match session.sink.send_frame(frame) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        user_id = %session.identity.id,
                        username = %session.identity.display_name,
                        "broadcast delivery failed, evicting session"
                    );
                    self.evict(session.identity.id.clone());
                },
            })
            .await;
        debug!(
            excluded,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast"
        );
        report
    }

    fn evict(&self, id: String) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            registry.remove(&id).await;
        });
    }
}
