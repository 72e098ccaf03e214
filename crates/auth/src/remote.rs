//! HTTP/JSON client for a remote identity service.

use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::StatusCode,
    tracing::{debug, warn},
};

use crate::{
    AuthError, AuthGateway, AuthOutcome,
    types::{CREATE_PATH, CredentialsRequest, HEALTH_PATH, LOGIN_PATH, UserResponse},
};

/// [`AuthGateway`] that forwards to the identity service over HTTP.
///
/// One `reqwest::Client` (and its connection pool) is built at startup and
/// reused for every call.
#[derive(Debug, Clone)]
pub struct RemoteAuthGateway {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteAuthGateway {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn call(&self, path: &str, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let body = CredentialsRequest {
            login: login.to_string(),
            password: password.to_string(),
        };
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        debug!(path, %status, "identity service replied");
        // 400 carries the same body shape with a validation message.
        if !(status.is_success() || status == StatusCode::BAD_REQUEST) {
            return Err(AuthError::Unavailable(format!("{path} returned {status}")));
        }

        let parsed: UserResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        parsed.into_outcome()
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    warn!(error = %e, "identity service request failed");
    AuthError::Unavailable(e.to_string())
}

#[async_trait]
impl AuthGateway for RemoteAuthGateway {
    async fn login(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        self.call(LOGIN_PATH, login, password).await
    }

    async fn create(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        self.call(CREATE_PATH, login, password).await
    }

    async fn check(&self) -> Result<(), AuthError> {
        self.client
            .get(self.url(HEALTH_PATH))
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
