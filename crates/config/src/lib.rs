//! Configuration loading: file discovery, `${ENV}` substitution and schema.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config, load_or_discover},
    schema::{GatewayConfig, IdentityConfig, ParleyConfig},
};
