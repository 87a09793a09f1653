//! In-process [`CacheStore`] for single-node deployments and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::entry::CacheEntry;
use crate::cache::store::{CacheStore, StoreError};

struct Record {
    raw: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Records are held encoded, exactly as a remote store would hold them.
/// Expired records are dropped when read, and swept from the whole map by
/// writes at most once per TTL.
pub struct MemoryStore {
    records: DashMap<String, Record>,
    ttl: Option<Duration>,
    last_sweep: Mutex<Instant>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// `ttl` of `None` keeps entries until flushed.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            last_sweep: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored records, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store raw bytes under `key`, bypassing entry encoding.
    pub fn insert_raw(&self, key: &str, raw: Vec<u8>) {
        self.records.insert(
            key.to_string(),
            Record {
                raw,
                expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    /// Drop every expired record if a TTL has passed since the last sweep.
    /// A sweep already running elsewhere is not waited for.
    fn sweep_expired(&self, now: Instant) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let mut last = match self.last_sweep.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if now.duration_since(*last) < ttl {
            return;
        }
        *last = now;
        drop(last);

        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        tracing::trace!(evicted = before.saturating_sub(self.records.len()), "Swept expired records");
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<CacheEntry, StoreError> {
        self.ensure_open()?;
        let now = Instant::now();
        {
            let record = self.records.get(key).ok_or(StoreError::NotFound)?;
            if !record.is_expired(now) {
                return Ok(CacheEntry::decode(&record.raw)?);
            }
        }
        self.records.remove_if(key, |_, record| record.is_expired(now));
        Err(StoreError::NotFound)
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.sweep_expired(Instant::now());
        self.insert_raw(key, entry.encode()?);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.records.clear();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
