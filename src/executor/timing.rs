//! Per-attempt phase timings.

use std::time::Duration;

use serde::Serialize;

/// Phase timings of one execution, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTiming {
    /// Request sent until response headers arrived.
    pub outbound_proxy_ms: f64,
    /// Response headers until the body was fully drained.
    pub response_receive_ms: f64,
    /// Request sent until the exchange finished, when measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_ms: Option<f64>,
}

impl NetworkTiming {
    /// Sample for executions that never reached the network.
    pub fn zero() -> Self {
        Self {
            outbound_proxy_ms: 0.0,
            response_receive_ms: 0.0,
            network_ms: Some(0.0),
        }
    }

    /// The single latency figure callers persist: `network_ms` rounded when it
    /// is a usable measurement, else the rounded sum of the finite phases,
    /// else 0.
    pub fn canonical_latency(&self) -> u64 {
        if let Some(network) = self.network_ms.filter(|v| v.is_finite() && *v >= 0.0) {
            return network.round() as u64;
        }

        let sum: f64 = [self.outbound_proxy_ms, self.response_receive_ms]
            .into_iter()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .sum();
        sum.round() as u64
    }
}

pub(crate) fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
