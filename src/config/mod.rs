//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults → TOML file (optional) → OUTBOUND_PROXY_* env
//!     → loader.rs (figment merge & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to the executor and the service at startup
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_from_str, load_from_env, ConfigError};
pub use schema::{
    DnsCacheConfig, ListenerConfig, LogFormat, ObservabilityConfig, OutboundConfig, ProxyConfig,
};
