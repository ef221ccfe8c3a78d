//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Execution:
//!     → timeouts.rs (one deadline for the whole call)
//!     → limiter.rs (admission into the in-flight ceiling, bounded by the deadline)
//!     → outbound client
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every suspension point has a deadline
//! - No retries: every failure is terminal for one execution
//! - Slots are RAII permits, released on success, failure or cancellation

pub mod limiter;
pub mod timeouts;

pub use limiter::{ConcurrencyLimiter, InflightPermit, LimiterError};
pub use timeouts::Deadline;
