//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits so they can be layered from defaults, a TOML
//! file and environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the outbound proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Inbound API listener configuration.
    pub listener: ListenerConfig,

    /// Outbound client ceilings.
    pub outbound: OutboundConfig,

    /// DNS cache used by the address safety validator.
    pub dns: DnsCacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration for the inbound API.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted size of an inbound API request body.
    pub max_request_bytes: usize,

    /// Hard ceiling on the lifetime of one inbound API request.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_request_bytes: 6 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Ceilings applied to every upstream call.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutboundConfig {
    /// Overall deadline for one execution (admission wait, connect, transfer).
    pub timeout_ms: u64,

    /// Maximum request and response body size in bytes.
    pub max_body_bytes: usize,

    /// Upstream error bodies above this size are replaced by a placeholder.
    pub max_error_payload_bytes: usize,

    /// Maximum concurrently open upstream sockets.
    pub max_sockets: usize,

    /// Maximum idle keep-alive sockets kept per host.
    pub max_idle_sockets: usize,

    /// Maximum concurrently executing upstream calls. 0 means unlimited.
    pub max_inflight: usize,

    /// User-Agent sent when the caller supplies none.
    pub user_agent: String,
}

impl OutboundConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_body_bytes: 5 * 1024 * 1024,
            max_error_payload_bytes: 64 * 1024,
            max_sockets: 200,
            max_idle_sockets: 20,
            max_inflight: 0,
            user_agent: concat!("outbound-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// DNS cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DnsCacheConfig {
    /// How long a resolved answer is reused, in milliseconds. 0 disables caching.
    pub cache_ttl_ms: u64,

    /// Maximum number of cached hostnames.
    pub cache_max_entries: usize,
}

impl DnsCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for DnsCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 30_000,
            cache_max_entries: 1_000,
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
