//! Caching reverse proxy.
//!
//! Forwards every request to a single origin, stores responses in a shared
//! key-value store, and coalesces concurrent misses for the same key into
//! one origin fetch. Paths matching the blacklist bypass the cache.

pub mod admin;
pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use cache::{CacheEntry, CacheStore, MemoryStore, RedisStore, StoreError};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::{ProxyServer, ProxyState};
pub use lifecycle::{Shutdown, StartupError};
