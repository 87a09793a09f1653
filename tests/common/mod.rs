//! Shared utilities for integration tests: a mock origin, store doubles and
//! a proxy started on an ephemeral port.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use caching_proxy::cache::{CacheEntry, CacheStore, MemoryStore, StoreError};
use caching_proxy::config::{ProxyConfig, StoreBackend};
use caching_proxy::http::{ProxyServer, ProxyState};
use caching_proxy::lifecycle::Shutdown;
use caching_proxy::net::Listener;

pub const SECRET: &str = "test-secret";

#[derive(Default)]
struct OriginState {
    hits: AtomicUsize,
    delay_ms: AtomicU64,
}

/// Axum origin that counts every request it serves.
///
/// - `/bytes/{n}`: `n` bytes of `x`
/// - `/status/{code}`: empty body with that status
/// - anything else: JSON echo of method, path, headers, body and hit number
#[derive(Clone)]
pub struct MockOrigin {
    pub addr: SocketAddr,
    state: Arc<OriginState>,
}

impl MockOrigin {
    pub async fn start() -> Self {
        let state = Arc::new(OriginState::default());
        let app = Router::new()
            .route("/bytes/{n}", get(bytes))
            .route("/status/{code}", any(status))
            .fallback(echo)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// Delay every subsequent response.
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

async fn pause(state: &OriginState) -> usize {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    hit
}

async fn echo(
    State(state): State<Arc<OriginState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let hit = pause(&state).await;
    let seen: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    (
        [
            ("x-origin", "mock"),
            ("set-cookie", "a=1"),
            ("cache-control", "max-age=60"),
        ],
        Json(json!({
            "method": method.as_str(),
            "path": uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"),
            "headers": seen,
            "body": String::from_utf8_lossy(&body),
            "hit": hit,
        })),
    )
}

async fn bytes(State(state): State<Arc<OriginState>>, Path(n): Path<usize>) -> impl IntoResponse {
    pause(&state).await;
    vec![b'x'; n]
}

async fn status(State(state): State<Arc<OriginState>>, Path(code): Path<u16>) -> impl IntoResponse {
    pause(&state).await;
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Counts store calls and delegates to a [`MemoryStore`].
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

impl RecordingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<CacheEntry, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, entry).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

/// Every operation fails, as an unreachable backend would.
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<CacheEntry, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _entry: &CacheEntry) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn close(&self) {}
}

/// Minimal valid configuration pointing at `origin`.
pub fn test_config(origin: &MockOrigin) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.server.origin = origin.url();
    config.server.secret = SECRET.to_string();
    config.server.request_timeout_secs = 5;
    config.server.shutdown_grace_secs = 1;
    config.store.backend = StoreBackend::Memory;
    config
}

/// A proxy serving on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig, store: Arc<dyn CacheStore>) -> Self {
        let state = ProxyState::new(config, store).unwrap();
        let listener = Listener::bind(&state.config.server.bind_address, 64)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server = ProxyServer::new(state);
        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

pub async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}
