//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP admit/reject)
//!     → limits.rs (path shape, body size)
//!     → blacklist.rs (bypass decision)
//!     → headers.rs (strip hop-by-hop before forwarding)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a malformed blacklist pattern stops startup
//! - Client input never reaches the origin unsanitized

pub mod blacklist;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use blacklist::{Blacklist, BlacklistError};
pub use headers::{canonical_name, is_hop_by_hop, sanitize_headers};
pub use limits::{read_request_body, validate_path};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
