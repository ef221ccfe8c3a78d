//! Execution subsystem.
//!
//! # Data Flow
//! ```text
//! ExecuteRequest
//!     → orchestrator.rs (validate → admit → send → drain → normalize)
//!     → timing.rs (phase timings, canonical latency)
//!     → Execution { NormalizedResult, NetworkTiming }
//! ```

pub mod orchestrator;
pub mod timing;

pub use orchestrator::{ExecuteOptions, ExecuteRequest, Execution, Executor};
pub use timing::NetworkTiming;
