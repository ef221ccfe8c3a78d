//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! executor / validator / server produce:
//!     → logging.rs (structured log events, per-attempt spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty, compact or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Secrets (header values, auth, bodies) are never logged
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
