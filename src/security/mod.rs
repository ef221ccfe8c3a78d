//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Caller request description:
//!     → auth.rs (apply bearer/basic/apikey, pure)
//!     → ssrf.rs (scheme, credentials, host, port, IP checks)
//!         → dns.rs (shared TTL cache, resolver seam)
//!         → ip.rs (private / reserved classification)
//!     → headers.rs (strip hop-by-hop and forwarding headers)
//!     → outbound client
//! ```
//!
//! # Design Decisions
//! - The API validates the target before execution and the executor
//!   validates it again; an earlier verdict is never reused
//! - Fail closed: reject on any check that cannot be completed
//! - No trust in caller input

pub mod auth;
pub mod dns;
pub mod headers;
pub mod ip;
pub mod ssrf;

pub use auth::{apply as apply_auth, ApiKeyLocation, Applied, Auth};
pub use dns::{CachingResolver, DnsCache, DnsCacheEntry, DnsError, HostResolver, SystemResolver};
pub use headers::{sanitize_headers, RawHeaders};
pub use ip::{is_private_ip, is_private_ip_str};
pub use ssrf::{AddressValidator, SafetyVerdict, TargetUrl};
