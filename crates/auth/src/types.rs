//! JSON bodies exchanged with the identity service.

use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthOutcome, Identity};

pub const LOGIN_PATH: &str = "/v1/login";
pub const CREATE_PATH: &str = "/v1/create";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

/// Body of both login and create responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    #[serde(default)]
    pub user: Option<Identity>,
    #[serde(default)]
    pub error: String,
}

impl UserResponse {
    pub fn granted(user: Identity) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: String::new(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            error: error.into(),
        }
    }

    pub fn into_outcome(self) -> Result<AuthOutcome, AuthError> {
        match (self.success, self.user) {
            (true, Some(user)) => Ok(AuthOutcome::Granted(user)),
            (true, None) => Err(AuthError::InvalidResponse(
                "success without a user".into(),
            )),
            (false, _) if self.error.is_empty() => {
                Ok(AuthOutcome::Rejected("authentication failed".into()))
            },
            (false, _) => Ok(AuthOutcome::Rejected(self.error)),
        }
    }
}
