//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and relationships.
//! Returns all validation errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration. Pure function.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_request_bytes == 0 {
        errors.push(ValidationError::new("listener.max_request_bytes", "must be > 0"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    let outbound = &config.outbound;
    if outbound.timeout_ms == 0 {
        errors.push(ValidationError::new("outbound.timeout_ms", "must be > 0"));
    }
    if outbound.max_body_bytes == 0 {
        errors.push(ValidationError::new("outbound.max_body_bytes", "must be > 0"));
    }
    if outbound.max_error_payload_bytes == 0 {
        errors.push(ValidationError::new("outbound.max_error_payload_bytes", "must be > 0"));
    }
    if outbound.max_sockets == 0 {
        errors.push(ValidationError::new("outbound.max_sockets", "must be > 0"));
    } else if outbound.max_idle_sockets > outbound.max_sockets {
        errors.push(ValidationError::new(
            "outbound.max_idle_sockets",
            format!("must not exceed max_sockets ({})", outbound.max_sockets),
        ));
    }

    if config.dns.cache_max_entries == 0 {
        errors.push(ValidationError::new("dns.cache_max_entries", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn idle_sockets_bounded_by_max_sockets() {
        let mut config = ProxyConfig::default();
        config.outbound.max_sockets = 10;
        config.outbound.max_idle_sockets = 11;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "outbound.max_idle_sockets");
    }

    #[test]
    fn collects_every_violation() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.outbound.max_body_bytes = 0;
        config.dns.cache_max_entries = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "outbound.max_body_bytes", "dns.cache_max_entries"]
        );
    }

    #[test]
    fn unlimited_inflight_is_valid() {
        let mut config = ProxyConfig::default();
        config.outbound.max_inflight = 0;
        assert!(validate_config(&config).is_ok());
    }
}
