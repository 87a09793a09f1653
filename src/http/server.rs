//! HTTP server setup and connection loop.
//!
//! # Responsibilities
//! - Build the Axum router: admin routes, proxy catch-all, middleware
//! - Serve HTTP/1.1 and h2c connections with a header read timeout
//! - Drain connections on shutdown, abort what outlives the grace period
//! - Release the store once traffic has stopped

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::{conn::auto, graceful::GracefulShutdown},
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::admin_routes;
use crate::http::handler::proxy_handler;
use crate::http::request::request_id;
use crate::http::state::ProxyState;
use crate::net::{ConnectionTracker, Listener};
use crate::security::{rate_limit_middleware, RateLimiter};

/// HTTP server for the caching proxy.
pub struct ProxyServer {
    router: Router,
    state: ProxyState,
}

impl ProxyServer {
    pub fn new(state: ProxyState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve `listener` until `shutdown` fires, then drain and close the store.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let server = &self.state.config.server;
        tracing::info!(
            address = %addr,
            origin = %self.state.origin.base(),
            max_connections = listener.max_connections(),
            "Caching proxy listening"
        );

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(server.header_read_timeout());

        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!(error = %err, "Accept failed");
                            // Typically fd exhaustion; give it a moment.
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let router = self.router.clone();
                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        router.clone().oneshot(request)
                    });

                    let conn = builder
                        .serve_connection(TokioIo::new(stream), service)
                        .into_owned();
                    let conn = graceful.watch(conn);
                    let guard = tracker.track(peer);

                    connections.spawn(async move {
                        if let Err(err) = conn.await {
                            tracing::debug!(
                                connection_id = %guard.id(),
                                peer_addr = %guard.peer(),
                                error = %err,
                                "Connection ended with error"
                            );
                        }
                        drop(permit);
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);

        let grace = server.shutdown_grace();
        tracing::info!(
            active_connections = tracker.active_count(),
            grace = ?grace,
            "Draining connections"
        );
        tokio::select! {
            _ = graceful.shutdown() => tracing::info!("All connections drained"),
            _ = tokio::time::sleep(grace) => tracing::warn!(
                remaining = tracker.active_count(),
                "Grace period elapsed, aborting remaining connections"
            ),
        }
        connections.abort_all();
        while connections.join_next().await.is_some() {}

        self.state.store.close().await;
        tracing::info!("Caching proxy stopped");
        Ok(())
    }
}

/// Admin routes, the proxy catch-all, and the middleware stack.
pub fn build_router(state: ProxyState) -> Router {
    let mut router = Router::new()
        .merge(admin_routes(state.clone()))
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(state.clone());

    if state.config.rate_limit.enabled {
        let limiter = Arc::new(RateLimiter::from_config(&state.config.rate_limit));
        router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
