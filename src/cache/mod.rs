//! Cache storage subsystem.
//!
//! # Data Flow
//! ```text
//! Origin response
//!     → entry.rs (CacheEntry, encode/decode)
//!     → store.rs (CacheStore contract)
//!         → redis_store.rs (shared Redis database, TTL via SET EX)
//!         → memory.rs (in-process map, TTL swept on write)
//!
//! Lookup:
//!     key.rs (origin:METHOD:path?query) → CacheStore::get → CacheEntry
//! ```
//!
//! # Design Decisions
//! - The store is injected as `Arc<dyn CacheStore>`; nothing holds a global client
//! - A record that fails to decode is an error, never a silent miss
//! - Every store call carries its own timeout

pub mod entry;
pub mod key;
pub mod memory;
pub mod redis_store;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

pub use entry::{CacheEntry, HeaderField};
pub use key::CacheKey;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CacheStore, StoreError};

use crate::config::{StoreBackend, StoreConfig};

/// Build the store selected by configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn CacheStore>, StoreError> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(config).await?)),
        StoreBackend::Memory => {
            tracing::warn!("Using in-process memory store; cache is not shared between instances");
            let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
            Ok(Arc::new(MemoryStore::new(ttl)))
        }
    }
}
