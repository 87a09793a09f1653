use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::cache::store::bounded;
use crate::http::state::ProxyState;
use crate::observability::metrics;

/// `POST /clear`: flush every cached entry.
pub async fn clear_cache(State(state): State<ProxyState>) -> Response {
    let limit = Duration::from_millis(state.config.store.op_timeout_ms);
    match bounded(limit, state.store.flush()).await {
        Ok(()) => {
            tracing::info!("Cache cleared");
            (StatusCode::OK, Json(json!({ "status": "cleared" }))).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "Cache clear failed");
            metrics::record_store_error("flush");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /health`: ready while the store answers a ping in time.
pub async fn health(State(state): State<ProxyState>) -> Response {
    let limit = Duration::from_millis(state.config.store.ping_timeout_ms);
    match bounded(limit, state.store.ping()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            metrics::record_store_error("ping");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not_ready", "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
