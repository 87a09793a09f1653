//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache outcome
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_origin_fetches_total` (counter): origin calls by outcome
//! - `proxy_origin_fetch_duration_seconds` (histogram): origin latency
//! - `proxy_coalesced_waiters_total` (counter): requests served by another caller's fetch
//! - `proxy_store_errors_total` (counter): store failures by operation
//! - `proxy_rate_limited_total` (counter): rejected by the rate limiter
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are low-cardinality: no paths or keys

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "cache" => cache)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_origin_fetch(outcome: &'static str, start: Instant) {
    counter!("proxy_origin_fetches_total", "outcome" => outcome).increment(1);
    histogram!("proxy_origin_fetch_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_coalesced_waiter() {
    counter!("proxy_coalesced_waiters_total").increment(1);
}

pub fn record_store_error(op: &'static str) {
    counter!("proxy_store_errors_total", "op" => op).increment(1);
}

pub fn record_rate_limited() {
    counter!("proxy_rate_limited_total").increment(1);
}
