//! Metrics collection and exposition.
//!
//! # Metrics
//! - `outbound_requests_total` (counter): executions by method, status, code
//! - `outbound_network_duration_seconds` (histogram): canonical latency
//! - `outbound_ssrf_blocked_total` (counter): targets rejected by the guard
//! - `outbound_inflight_requests` (gauge): admitted executions
//!
//! # Design Decisions
//! - Uses the `metrics` facade; the Prometheus exporter is only installed
//!   when enabled in config
//! - Labels never include the target URL (unbounded cardinality)

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "outbound_requests_total";
pub const NETWORK_DURATION: &str = "outbound_network_duration_seconds";
pub const SSRF_BLOCKED_TOTAL: &str = "outbound_ssrf_blocked_total";
pub const INFLIGHT_REQUESTS: &str = "outbound_inflight_requests";

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    register_metrics();
    tracing::info!(address = %addr, "Prometheus metrics endpoint listening");
    Ok(())
}

fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Outbound executions by method, status and code");
    describe_histogram!(NETWORK_DURATION, "Canonical upstream latency in seconds");
    describe_counter!(SSRF_BLOCKED_TOTAL, "Targets rejected by address validation");
    describe_gauge!(INFLIGHT_REQUESTS, "Executions currently holding an admission slot");
}

/// Record one finished execution. `code` is empty on success.
pub fn record_execution(method: &str, status: u16, code: &str, latency_ms: u64) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
    metrics::histogram!(NETWORK_DURATION, "method" => method.to_string())
        .record(latency_ms as f64 / 1000.0);
}

pub fn record_ssrf_block() {
    metrics::counter!(SSRF_BLOCKED_TOTAL).increment(1);
}

pub fn set_inflight(count: usize) {
    metrics::gauge!(INFLIGHT_REQUESTS).set(count as f64);
}
