//! Configuration loading.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. TOML file, when one is given
//! 3. `OUTBOUND_PROXY_*` environment variables, `__` separating sections
//!    (e.g. `OUTBOUND_PROXY_OUTBOUND__MAX_INFLIGHT=8`)

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "OUTBOUND_PROXY_";

/// `OUTBOUND_PROXY_CONFIG` names the config file; it is not a setting.
const CONFIG_PATH_KEY: &str = "config";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] Box<figment::Error>),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn base_figment() -> Figment {
    Figment::new().merge(Serialized::defaults(ProxyConfig::default()))
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__").ignore(&[CONFIG_PATH_KEY])
}

fn finish(figment: Figment) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = figment.extract().map_err(Box::new)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load configuration from defaults and environment only.
pub fn load_from_env() -> Result<ProxyConfig, ConfigError> {
    finish(base_figment().merge(env_provider()))
}

/// Load and validate configuration from a TOML file plus environment overrides.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    finish(base_figment().merge(Toml::file(path)).merge(env_provider()))
}

/// Load configuration from TOML text, without environment overrides.
pub fn load_config_from_str(toml: &str) -> Result<ProxyConfig, ConfigError> {
    finish(base_figment().merge(Toml::string(toml)))
}
