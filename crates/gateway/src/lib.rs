//! Real-time chat gateway.
//!
//! Clients connect over WebSocket, authenticate against the identity
//! backend, and every chat line they send is fanned out to all other
//! authenticated sessions.

pub mod broadcast;
pub mod handler;
pub mod history;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

pub use {
    broadcast::{BroadcastEngine, BroadcastReport},
    handler::{SessionError, SessionHandler, SessionState},
    history::MessageHistory,
    registry::ConnectionRegistry,
    server::{build_gateway_app, serve, shutdown_signal, start_gateway},
    session::{Session, SessionSink, SinkClosed},
    state::GatewayState,
};
