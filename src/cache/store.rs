//! Backing store contract.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::entry::{CacheEntry, EntryDecodeError};

/// Failures reported by a [`CacheStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store connection closed")]
    Closed,
    #[error("corrupt cache record: {0}")]
    Corrupt(#[from] EntryDecodeError),
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Key-value service holding encoded [`CacheEntry`] records.
///
/// Implementations own their own synchronization; one instance is shared by
/// every request through `Arc<dyn CacheStore>`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch and decode the entry stored under `key`.
    async fn get(&self, key: &str) -> Result<CacheEntry, StoreError>;

    /// Encode and store `entry` with the configured TTL.
    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Remove every entry.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Bound a store call, mapping expiry to [`StoreError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
