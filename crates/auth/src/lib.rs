//! Identity backend access.
//!
//! The chat gateway only sees the [`AuthGateway`] trait. Two implementations
//! ship here: [`RemoteAuthGateway`] talks HTTP/JSON to a separate identity
//! service, [`LocalAuthGateway`] verifies against an in-process
//! [`UserStore`]. The same store can be exposed over HTTP with
//! [`service::identity_router`], which is what the remote client talks to.

pub mod local;
pub mod remote;
pub mod service;
pub mod store;
pub mod types;

use async_trait::async_trait;

pub use {
    local::LocalAuthGateway,
    parley_protocol::Identity,
    remote::RemoteAuthGateway,
    store::{StoreError, UserStore},
};

/// Result of a credential check that reached the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted(Identity),
    /// Credentials were checked and refused; the reason is user-facing.
    Rejected(String),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Failure to get an answer from the identity service at all.
///
/// Never used for bad credentials, those are `Ok(AuthOutcome::Rejected)`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
    #[error("identity service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Credential verification against the identity backend.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError>;

    /// Register a new account. Not part of the chat protocol.
    async fn create(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError>;

    /// Connectivity probe, run once before the gateway starts listening.
    async fn check(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
