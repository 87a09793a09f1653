//! Proxy pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → validate path (400)
//!     → blacklist decision (BYPASS / cacheable)
//!     → read body under limit (413) and deadline (408)
//!     → BYPASS: coalesced origin fetch, never stored
//!     → cacheable: store lookup → HIT
//!                  else coalesced origin fetch + single store write → MISS
//!     → replay entry with X-Cache
//! ```
//!
//! # Design Decisions
//! - The bypass decision short-circuits before any store access
//! - Store failures degrade to an origin fetch; they never fail the request
//! - The leader writes the store before its result is published, so a
//!   request arriving after a MISS completes sees the entry

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
};

use crate::cache::{CacheEntry, CacheKey, StoreError};
use crate::coalesce::Role;
use crate::error::ProxyError;
use crate::http::origin::OriginRequest;
use crate::http::request::request_id;
use crate::http::response::{replay, tag, CacheStatus};
use crate::http::state::ProxyState;
use crate::observability::metrics;
use crate::security::{read_request_body, validate_path};

/// Catch-all handler for every non-admin route.
pub async fn proxy_handler(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers).to_string();
    let method = parts.method.clone();

    let path = match validate_path(&parts.uri) {
        Ok(path) => path,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "Rejected request path");
            let response = err.into_response();
            metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
            return response;
        }
    };

    let key = CacheKey::new(state.origin.base(), &method, &path);
    let cache = if state.blacklist.is_match(parts.uri.path()) {
        CacheStatus::Bypass
    } else {
        CacheStatus::Miss
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        cache = %cache,
        "Proxying request"
    );

    let limit = state.config.server.max_request_body;
    let deadline = state.config.server.request_timeout();
    let (response, cache) = match read_request_body(&parts.headers, body, limit, deadline).await {
        Ok(body) => {
            let origin_request = OriginRequest {
                method: method.clone(),
                path_and_query: path,
                headers: parts.headers,
                body,
            };
            serve(&state, &key, cache, origin_request, &request_id).await
        }
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "Rejected request body");
            (err.into_response(), cache)
        }
    };

    let response = tag(response, cache);
    metrics::record_request(method.as_str(), response.status().as_u16(), cache.as_str(), start);
    response
}

async fn serve(
    state: &ProxyState,
    key: &CacheKey,
    decision: CacheStatus,
    request: OriginRequest,
    request_id: &str,
) -> (Response, CacheStatus) {
    if decision == CacheStatus::Bypass {
        return match fetch(state, key, request, false, request_id).await {
            Ok(entry) => (replay(&entry, CacheStatus::Bypass), CacheStatus::Bypass),
            Err(err) => (error_response(err, request_id), CacheStatus::Bypass),
        };
    }

    match state.store.get(key.as_str()).await {
        Ok(entry) => {
            tracing::debug!(request_id = %request_id, key = %key, "Cache hit");
            return (replay(&entry, CacheStatus::Hit), CacheStatus::Hit);
        }
        Err(StoreError::NotFound) => {
            tracing::debug!(request_id = %request_id, key = %key, "Cache miss");
        }
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                key = %key,
                error = %err,
                "Cache read failed, fetching from origin"
            );
            metrics::record_store_error("get");
        }
    }

    match fetch(state, key, request, true, request_id).await {
        Ok(entry) => (replay(&entry, CacheStatus::Miss), CacheStatus::Miss),
        Err(err) => (error_response(err, request_id), CacheStatus::Miss),
    }
}

/// One origin fetch per key at a time; later callers share the leader's
/// outcome. With `persist`, the leader writes the entry to the store.
async fn fetch(
    state: &ProxyState,
    key: &CacheKey,
    request: OriginRequest,
    persist: bool,
    request_id: &str,
) -> Result<Arc<CacheEntry>, ProxyError> {
    let origin = state.origin.clone();
    let store = persist.then(|| Arc::clone(&state.store));
    let store_key = key.to_string();

    let flight = state
        .fetches
        .run(key.as_str(), move || async move {
            let start = Instant::now();
            let result = origin.fetch(request).await;
            metrics::record_origin_fetch(if result.is_ok() { "ok" } else { "error" }, start);
            let entry = Arc::new(result?);

            if let Some(store) = store {
                if let Err(err) = store.set(&store_key, &entry).await {
                    tracing::warn!(key = %store_key, error = %err, "Cache write failed");
                    metrics::record_store_error("set");
                }
            }
            Ok::<_, ProxyError>(entry)
        })
        .await;

    if flight.role == Role::Waiter {
        tracing::debug!(request_id = %request_id, key = %key, "Joined in-flight origin fetch");
        metrics::record_coalesced_waiter();
    }
    flight.result
}

fn error_response(err: ProxyError, request_id: &str) -> Response {
    tracing::error!(request_id = %request_id, error = %err, "Origin fetch failed");
    err.into_response()
}
