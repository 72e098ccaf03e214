use std::time::Instant;

use tokio::sync::mpsc;

use parley_protocol::{ChatResponse, Identity};

use crate::handler::SessionError;

/// The outbound side of a client connection was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session sink closed")]
pub struct SinkClosed;

/// Handle for pushing serialized frames to one connection's write loop.
///
/// Cloning is cheap; all clones feed the same socket.
#[derive(Debug, Clone)]
pub struct SessionSink {
    conn_id: String,
    sender: mpsc::UnboundedSender<String>,
}

impl SessionSink {
    /// Create a sink and the receiver its write loop drains.
    pub fn channel(conn_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: conn_id.into(),
                sender,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Queue an already serialized frame.
    pub fn send_frame(&self, frame: &str) -> Result<(), SinkClosed> {
        self.sender.send(frame.to_string()).map_err(|_| SinkClosed)
    }

    /// Serialize and queue a response.
    pub fn send(&self, response: &ChatResponse) -> Result<(), SessionError> {
        let frame = response
            .to_frame()
            .map_err(|e| SessionError::Encode(e.to_string()))?;
        self.send_frame(&frame)?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// An authenticated connection as seen by the registry.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub sink: SessionSink,
    pub registered_at: Instant,
}

impl Session {
    pub fn new(identity: Identity, sink: SessionSink) -> Self {
        Self {
            identity,
            sink,
            registered_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }
}
