//! SSRF-safe outbound request execution library.

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{ErrorCode, ProxyError};
pub use executor::{ExecuteOptions, ExecuteRequest, Execution, Executor, NetworkTiming};
pub use http::{HttpServer, NormalizedResult};
pub use lifecycle::Shutdown;
