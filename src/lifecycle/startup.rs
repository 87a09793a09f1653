//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the cache store and build the shared request state
//! - Bind the listener and hand it to the server
//!
//! # Design Decisions
//! - Fail fast: a store that cannot be reached at startup is fatal
//! - The listener binds last, so traffic only arrives once everything is ready

use crate::cache::{self, StoreError};
use crate::config::{ConfigError, ProxyConfig, StoreConfig};
use crate::http::{ProxyServer, ProxyState, StateError};
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::logging::LoggingError;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
    #[error("metrics exporter failed: {0}")]
    Metrics(String),
    #[error("cache store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Bind(ListenerError),
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Connect the configured store and assemble the request state.
pub async fn build_state(config: ProxyConfig) -> Result<ProxyState, StartupError> {
    let store = cache::connect(&config.store).await?;
    match ProxyState::new(config, store.clone()) {
        Ok(state) => Ok(state),
        Err(err) => {
            store.close().await;
            Err(err.into())
        }
    }
}

/// Serve until `shutdown` fires. The store is closed on every exit path.
pub async fn run(config: ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let state = build_state(config).await?;

    let server = &state.config.server;
    let listener = match Listener::bind(&server.bind_address, server.max_connections).await {
        Ok(listener) => listener,
        Err(err) => {
            state.store.close().await;
            return Err(StartupError::Bind(err));
        }
    };

    ProxyServer::new(state).run(listener, shutdown.subscribe()).await?;
    Ok(())
}

/// Flush every entry in the configured store and disconnect.
pub async fn clear_store(config: &StoreConfig) -> Result<(), StartupError> {
    let store = cache::connect(config).await?;
    let result = store.flush().await;
    store.close().await;
    result?;
    tracing::info!("Cache cleared");
    Ok(())
}
