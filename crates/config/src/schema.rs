/// Config schema for the chat gateway and its identity backend.
use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY_PORT: u16 = 50052;
pub const DEFAULT_IDENTITY_PORT: u16 = 50051;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub gateway: GatewayConfig,
    pub identity: IdentityConfig,
}

/// Chat listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Number of recent chat messages kept in memory.
    pub history_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: DEFAULT_GATEWAY_PORT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Where the gateway reaches the identity service, and where the bundled
/// identity service listens when run locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the identity backend.
    pub url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub bind: String,
    pub port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: format!("http://127.0.0.1:{DEFAULT_IDENTITY_PORT}"),
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            bind: "127.0.0.1".into(),
            port: DEFAULT_IDENTITY_PORT,
        }
    }
}
