//! Caching reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                   CACHING PROXY                      │
//!                    │                                                      │
//!   Client Request   │  ┌──────────┐   ┌──────────┐   ┌─────────────────┐   │
//!   ─────────────────┼─▶│   net    │──▶│   http   │──▶│ blacklist check │   │
//!                    │  │ listener │   │  server  │   └───────┬─────────┘   │
//!                    │  └──────────┘   └──────────┘           │             │
//!                    │                                        ▼             │
//!                    │                 ┌──────────┐   ┌─────────────────┐   │
//!                    │                 │  cache   │◀─▶│ store lookup    │   │    ┌───────┐
//!                    │                 │  store   │   └───────┬─────────┘   │◀──▶│ Redis │
//!                    │                 └──────────┘           │ miss        │    └───────┘
//!                    │                                        ▼             │
//!   Client Response  │  ┌──────────┐                  ┌─────────────────┐   │
//!   ◀────────────────┼──│ response │◀─────────────────│ coalesced fetch │◀──┼──── Origin
//!                    │  │ X-Cache  │                  └─────────────────┘   │
//!                    │  └──────────┘                                        │
//!                    │                                                      │
//!                    │   admin: POST /clear (bearer), GET /health           │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use caching_proxy::config::loader::{apply_env_overrides, with_port};
use caching_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
use caching_proxy::lifecycle::{self, spawn_signal_handler, Shutdown, StartupError};
use caching_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "caching-proxy", version)]
#[command(about = "Caching reverse proxy backed by Redis", long_about = None)]
struct Cli {
    /// TOML configuration file. Without one, defaults and environment apply.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin base URL; overrides the configuration file.
    #[arg(short, long)]
    origin: Option<String>,

    /// Listen port; overrides the configured bind address's port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Flush the configured cache store and exit.
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("caching-proxy: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&config.logging) {
        eprintln!("caching-proxy: {}", err);
        return ExitCode::FAILURE;
    }

    match start(cli.clear, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Caching proxy failed");
            ExitCode::FAILURE
        }
    }
}

/// File (or defaults), then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => {
            let mut config = ProxyConfig::default();
            apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
            config
        }
    };

    if let Some(origin) = &cli.origin {
        config.server.origin = origin.clone();
    }
    if let Some(port) = cli.port {
        config.server.bind_address = with_port(&config.server.bind_address, port);
    }

    // Clearing only needs the store section.
    if !cli.clear {
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

async fn start(clear: bool, config: ProxyConfig) -> Result<(), StartupError> {
    if clear {
        return lifecycle::clear_store(&config.store).await;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        origin = %config.server.origin,
        bind_address = %config.server.bind_address,
        store = ?config.store.backend,
        blacklist_patterns = config.blacklist.len(),
        "caching-proxy starting"
    );

    if config.metrics.enabled {
        let addr = config
            .metrics
            .address
            .parse::<SocketAddr>()
            .map_err(|e| StartupError::Metrics(format!("invalid address: {}", e)))?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    lifecycle::run(config, &shutdown).await
}
