//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! API caller
//!     → server.rs (Axum routes, request ID, auth/param application)
//!     → executor
//!         → request.rs (immutable outbound spec, sanitized headers)
//!         → client.rs (pooled reqwest client, socket ceiling)
//!         → response.rs (streamed drain, decoding, error envelope)
//!     → NormalizedResult back to the caller
//! ```

pub mod client;
pub mod request;
pub mod response;
pub mod server;

pub use client::{OutboundClient, UpstreamResponse};
pub use request::{OutboundRequestSpec, RequestBody};
pub use response::{NormalizedResult, ResponseData, ResponseNormalizer, UpstreamReply};
pub use server::{build_router, AppState, HttpServer};
