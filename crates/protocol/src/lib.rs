//! Wire types shared by the chat gateway, the identity client and tests.
//!
//! Frames are JSON objects internally tagged by `type`. Requests flow from
//! client to gateway, responses from gateway to client (either as a direct
//! reply or as fan-out traffic from other sessions).

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Error codes carried in [`ChatResponse::Error`].
pub mod error_codes {
    pub const ALREADY_AUTHENTICATED: &str = "ALREADY_AUTHENTICATED";
    pub const NOT_AUTHENTICATED: &str = "NOT_AUTHENTICATED";
    pub const UNKNOWN_REQUEST: &str = "UNKNOWN_REQUEST";
}

// ── Identity ─────────────────────────────────────────────────────────────────

/// A verified user, as returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("invalid frame: {0}")]
    Decode(#[from] serde_json::Error),
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// Client → gateway request. Unrecognized `type` tags decode to `Unknown`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatRequest {
    Auth { login: String, password: String },
    Message { text: String },
    #[serde(other)]
    Unknown,
}

impl std::fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth { login, .. } => f
                .debug_struct("Auth")
                .field("login", login)
                .field("password", &"[redacted]")
                .finish(),
            Self::Message { text } => f.debug_struct("Message").field("text", text).finish(),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

impl ChatRequest {
    pub fn auth(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Auth {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    /// Parse a text frame.
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parse a binary frame that carries UTF-8 JSON.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(raw).map_err(|_| FrameError::NotUtf8)?;
        Self::decode(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Message { .. } => "message",
            Self::Unknown => "unknown",
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// Gateway → client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponse {
    Auth(AuthResponse),
    Message(ChatMessage),
    System(SystemNotification),
    Error(ErrorShape),
}

impl ChatResponse {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error(ErrorShape::new(code, message))
    }

    pub fn to_frame(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl AuthResponse {
    pub fn granted(identity: Identity) -> Self {
        Self {
            success: true,
            error: None,
            identity: Some(identity),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            identity: None,
        }
    }
}

/// A chat line as fanned out to recipients and kept in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Joined,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub kind: NotificationKind,
    pub username: String,
    pub text: String,
}

impl SystemNotification {
    pub fn joined(username: &str) -> Self {
        Self {
            kind: NotificationKind::Joined,
            username: username.to_string(),
            text: format!("{username} has joined the chat"),
        }
    }

    pub fn left(username: &str) -> Self {
        Self {
            kind: NotificationKind::Left,
            username: username.to_string(),
            text: format!("{username} has left the chat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
