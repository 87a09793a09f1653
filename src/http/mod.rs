//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! connection (net::listener)
//!     → server.rs (hyper auto builder, Axum router, middleware)
//!     → request.rs (request ID)
//!     → handler.rs (proxy pipeline)  |  admin routes
//!     → origin.rs (forward to origin, drain under limit)
//!     → response.rs (replay entry, X-Cache)
//! ```

pub mod body;
pub mod handler;
pub mod origin;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use handler::proxy_handler;
pub use origin::{OriginClient, OriginRequest};
pub use request::X_REQUEST_ID;
pub use response::{CacheStatus, X_CACHE};
pub use server::{build_router, ProxyServer};
pub use state::{ProxyState, StateError};
