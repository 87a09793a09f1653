//! Per-client rate limiting middleware.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Buckets idle for this many windows are dropped.
const IDLE_WINDOWS: u32 = 4;

/// Token bucket refilled at `requests / window`.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Buckets {
    by_client: HashMap<IpAddr, TokenBucket>,
    last_prune: Instant,
}

/// Admits at most `requests` per `window` for each client address.
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
    capacity: f64,
    refill_per_sec: f64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        let window = window.max(Duration::from_millis(1));
        Self {
            buckets: Mutex::new(Buckets {
                by_client: HashMap::new(),
                last_prune: Instant::now(),
            }),
            capacity: f64::from(requests),
            refill_per_sec: f64::from(requests) / window.as_secs_f64(),
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, Duration::from_secs(config.window_secs))
    }

    /// Admit or reject one request from `client`.
    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let idle = self.window * IDLE_WINDOWS;
        if now.duration_since(buckets.last_prune) >= idle {
            buckets
                .by_client
                .retain(|_, bucket| now.duration_since(bucket.last_update) < idle);
            buckets.last_prune = now;
        }

        let capacity = self.capacity;
        buckets
            .by_client
            .entry(client)
            .or_insert_with(|| TokenBucket::new(capacity, now))
            .try_acquire(capacity, self.refill_per_sec, now)
    }

    fn tracked_clients(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_client
            .len()
    }
}

/// Rejects requests over the limit with 429 before they reach any handler.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    // Without a peer address there is nothing to key on.
    let Some(client) = client else {
        return next.run(request).await;
    };

    if limiter.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

    #[test]
    fn admits_up_to_the_limit_per_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now));
        assert!(limiter.check_at(CLIENT, now));
        assert!(limiter.check_at(CLIENT, now));
        assert!(!limiter.check_at(CLIENT, now));

        // A full window refills the bucket.
        assert!(limiter.check_at(CLIENT, now + Duration::from_secs(60)));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let other: IpAddr = "10.0.0.2".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.check_at(CLIENT, now));
        assert!(!limiter.check_at(CLIENT, now));
        assert!(limiter.check_at(other, now));
    }

    #[test]
    fn idle_clients_are_pruned() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let now = Instant::now();
        limiter.check_at(CLIENT, now);
        assert_eq!(limiter.tracked_clients(), 1);

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        limiter.check_at(other, now + Duration::from_secs(10));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
