//! Client response construction.
//!
//! # Responsibilities
//! - Replay a `CacheEntry` as an HTTP response
//! - Tag every pipeline response with `X-Cache`
//!
//! # Design Decisions
//! - Hop-by-hop headers recorded by older entries are dropped on replay
//! - The proxy's own `X-Cache` replaces any the origin sent

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};

use crate::cache::CacheEntry;
use crate::security::is_hop_by_hop;

pub const X_CACHE: &str = "x-cache";

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Fetched from the origin and stored.
    Miss,
    /// Blacklisted path; fetched and never stored.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the client response for `entry`.
pub fn replay(entry: &CacheEntry, cache: CacheStatus) -> Response {
    let mut response = Response::new(Body::from(entry.body.clone()));
    *response.status_mut() = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for field in &entry.headers {
        if is_hop_by_hop(&field.name) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(field.name.as_bytes()) else {
            tracing::debug!(header = %field.name, "Skipping unrepresentable header name");
            continue;
        };
        for value in &field.values {
            match HeaderValue::from_bytes(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => tracing::debug!(header = %field.name, "Skipping unrepresentable header value"),
            }
        }
    }

    tag(response, cache)
}

/// Set `X-Cache` on `response`.
pub fn tag(mut response: Response, cache: CacheStatus) -> Response {
    response.headers_mut().insert(
        HeaderName::from_static(X_CACHE),
        HeaderValue::from_static(cache.as_str()),
    );
    response
}
