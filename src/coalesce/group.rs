//! Keyed single-flight execution.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

/// The leader task ended without producing a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct LeaderAborted(&'static str);

impl LeaderAborted {
    fn panicked() -> Self {
        LeaderAborted("leader task panicked")
    }

    fn cancelled() -> Self {
        LeaderAborted("leader task cancelled")
    }
}

/// How a caller took part in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started the operation.
    Leader,
    /// Joined an operation already in flight.
    Waiter,
}

/// Outcome handed to one caller.
#[derive(Debug)]
pub struct Flight<V, E> {
    pub result: Result<V, E>,
    pub role: Role,
}

type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct InFlight<V, E> {
    id: u64,
    result: SharedResult<V, E>,
}

/// Deduplicates concurrent operations by key.
///
/// The first caller for an idle key becomes the leader and its operation is
/// spawned onto its own task; callers arriving while it runs share its result.
/// The map's shard lock covers only admitting or removing a flight: the
/// leader's operation is built and spawned after the lock is released.
pub struct Coalescer<V, E> {
    inflight: Arc<DashMap<String, InFlight<V, E>>>,
    next_id: AtomicU64,
}

impl<V, E> Coalescer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<LeaderAborted> + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `operation` for `key`, or join the execution already in flight.
    ///
    /// `operation` is only invoked by the leader. The spawned operation runs
    /// to completion even if every caller stops waiting.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> Flight<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut admitted = None;
        let shared = match self.inflight.entry(key.to_owned()) {
            Entry::Occupied(existing) => existing.get().result.clone(),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (publish, outcome) = oneshot::channel();
                let shared = async move {
                    outcome
                        .await
                        .unwrap_or_else(|_| Err(E::from(LeaderAborted::cancelled())))
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    id,
                    result: shared.clone(),
                });
                admitted = Some((id, publish));
                shared
            }
        };

        let role = match admitted {
            None => Role::Waiter,
            Some((id, publish)) => {
                // Created first so a panicking `operation` still clears the slot.
                let landing = Landing {
                    inflight: Arc::clone(&self.inflight),
                    key: key.to_owned(),
                    id,
                };
                let work = operation();
                tokio::spawn(async move {
                    let result = match AssertUnwindSafe(work).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(E::from(LeaderAborted::panicked())),
                    };
                    // Leave the map before publishing.
                    drop(landing);
                    let _ = publish.send(result);
                });
                Role::Leader
            }
        };

        Flight {
            result: shared.await,
            role,
        }
    }

    /// Number of keys with an operation currently executing.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<V, E> Default for Coalescer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<LeaderAborted> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a finished flight from the map.
struct Landing<V, E> {
    inflight: Arc<DashMap<String, InFlight<V, E>>>,
    key: String,
    id: u64,
}

impl<V, E> Drop for Landing<V, E> {
    fn drop(&mut self) {
        let id = self.id;
        self.inflight.remove_if(&self.key, |_, flight| flight.id == id);
    }
}
