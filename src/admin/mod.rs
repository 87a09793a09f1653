//! Administrative endpoints: cache clear and readiness.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::{clear_cache, health};
use crate::http::state::ProxyState;

/// Admin routes, merged ahead of the proxy catch-all.
pub fn admin_routes(state: ProxyState) -> Router<ProxyState> {
    let protected = Router::new()
        .route("/clear", post(clear_cache))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new().route("/health", get(health)).merge(protected)
}
