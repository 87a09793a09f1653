//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default inbound body cap: 8 MiB.
pub const DEFAULT_MAX_REQUEST_BODY: usize = 8 * 1024 * 1024;

/// Default origin response cap: 15 MiB.
pub const DEFAULT_MAX_RESPONSE_BODY: usize = 15 * 1024 * 1024;

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Regular expressions; matching request paths bypass the cache.
    pub blacklist: Vec<String>,

    /// Listener, origin address and request limits.
    pub server: ServerConfig,

    /// Outbound client tuning.
    pub origin: OriginConfig,

    /// Backing store connection and TTL.
    pub store: StoreConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Log level, format and destination.
    pub logging: LoggingConfig,

    /// Prometheus exporter.
    pub metrics: MetricsConfig,
}

/// Listener and request handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the origin, e.g. "https://api.example.com".
    pub origin: String,

    /// Bearer token required by `POST /clear`.
    pub secret: String,

    /// Bound on one origin exchange, in seconds.
    pub request_timeout_secs: u64,

    /// Time a connection may take to send request headers.
    pub header_read_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace_secs: u64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Largest accepted request body in bytes.
    pub max_request_body: usize,

    /// Largest origin response body in bytes.
    pub max_response_body: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Origin base URL without a trailing slash.
    pub fn origin_base(&self) -> &str {
        self.origin.trim_end_matches('/')
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            origin: String::new(),
            secret: String::new(),
            request_timeout_secs: 30,
            header_read_timeout_secs: 10,
            shutdown_grace_secs: 10,
            max_connections: 10_000,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
            max_response_body: DEFAULT_MAX_RESPONSE_BODY,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle connections kept per origin host.
    pub pool_max_idle_per_host: usize,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Which store implementation backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Backing store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,

    /// Entry lifetime in seconds; 0 keeps entries until flushed.
    pub ttl_secs: u64,

    /// Bound on get/set/flush, in milliseconds.
    pub op_timeout_ms: u64,

    /// Bound on the health probe, in milliseconds.
    pub ping_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            ttl_secs: 600,
            op_timeout_ms: 1000,
            ping_timeout_ms: 500,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests admitted per client in one window.
    pub requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests: 100,
            window_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,

    /// Append to this file instead of stdout when non-empty.
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: String::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
