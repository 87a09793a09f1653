//! Redis-backed [`CacheStore`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::cache::entry::CacheEntry;
use crate::cache::store::{bounded, CacheStore, StoreError};
use crate::config::StoreConfig;

/// Store backed by a Redis database.
///
/// Uses a multiplexed, auto-reconnecting `ConnectionManager`; clones of the
/// manager share one connection, so handing a clone to each call is cheap.
pub struct RedisStore {
    conn: Mutex<Option<ConnectionManager>>,
    ttl_secs: u64,
    op_timeout: Duration,
    ping_timeout: Duration,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = redis_url(config)?;
        let client = redis::Client::open(url.as_str())?;
        let op_timeout = Duration::from_millis(config.op_timeout_ms);

        let manager = bounded(op_timeout, async {
            ConnectionManager::new(client).await.map_err(StoreError::from)
        })
        .await?;

        let store = Self {
            conn: Mutex::new(Some(manager)),
            ttl_secs: config.ttl_secs,
            op_timeout,
            ping_timeout: Duration::from_millis(config.ping_timeout_ms),
        };
        store.ping().await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            ttl_secs = config.ttl_secs,
            "Connected to Redis"
        );
        Ok(store)
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)
    }
}

/// `redis://[:password@]host:port/db`, with the password percent-encoded.
fn redis_url(config: &StoreConfig) -> Result<url::Url, StoreError> {
    let mut url = url::Url::parse(&format!("redis://{}:{}/{}", config.host, config.port, config.db))
        .map_err(|e| StoreError::Backend(format!("invalid redis address: {}", e)))?;
    if !config.password.is_empty() && url.set_password(Some(&config.password)).is_err() {
        return Err(StoreError::Backend("redis address cannot carry a password".into()));
    }
    Ok(url)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<CacheEntry, StoreError> {
        let mut conn = self.connection()?;
        let raw: Option<Vec<u8>> = bounded(self.op_timeout, async {
            conn.get(key).await.map_err(StoreError::from)
        })
        .await?;

        match raw {
            Some(raw) => Ok(CacheEntry::decode(&raw)?),
            None => Err(StoreError::NotFound),
        }
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        let encoded = entry.encode()?;
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(encoded);
        if self.ttl_secs > 0 {
            cmd.arg("EX").arg(self.ttl_secs);
        }

        bounded(self.op_timeout, async {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        bounded(self.ping_timeout, async {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        bounded(self.op_timeout, async {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn close(&self) {
        let taken = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            tracing::info!("Redis connection released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_db_and_password() {
        let config = StoreConfig {
            host: "cache.internal".into(),
            port: 6380,
            db: 2,
            password: "p@ss".into(),
            ..StoreConfig::default()
        };

        let url = redis_url(&config).unwrap();
        assert_eq!(url.host_str(), Some("cache.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/2");
        assert_eq!(url.password(), Some("p%40ss"));
    }

    #[test]
    fn url_without_password() {
        let url = redis_url(&StoreConfig::default()).unwrap();
        assert_eq!(url.as_str(), "redis://localhost:6379/0");
    }
}
