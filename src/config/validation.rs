//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Compile blacklist patterns so a bad one stops startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ProxyConfig, StoreBackend};
use crate::security::Blacklist;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    match url::Url::parse(&server.origin) {
        _ if server.origin.is_empty() => {
            errors.push(ValidationError::new("server.origin", "origin server not specified"))
        }
        Ok(url) if !matches!(url.scheme(), "http" | "https") => errors.push(ValidationError::new(
            "server.origin",
            format!("unsupported scheme {:?}", url.scheme()),
        )),
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::new("server.origin", "origin has no host"))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("server.origin", e.to_string())),
    }

    if server.secret.is_empty() {
        errors.push(ValidationError::new("server.secret", "secret not specified"));
    }
    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("{:?} is not a socket address", server.bind_address),
        ));
    }

    let positive = [
        ("server.request_timeout_secs", server.request_timeout_secs),
        ("server.header_read_timeout_secs", server.header_read_timeout_secs),
        ("server.max_connections", server.max_connections as u64),
        ("server.max_request_body", server.max_request_body as u64),
        ("server.max_response_body", server.max_response_body as u64),
        ("origin.connect_timeout_secs", config.origin.connect_timeout_secs),
        ("store.op_timeout_ms", config.store.op_timeout_ms),
        ("store.ping_timeout_ms", config.store.ping_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.store.backend == StoreBackend::Redis && config.store.host.is_empty() {
        errors.push(ValidationError::new("store.host", "redis host not specified"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests == 0 {
            errors.push(ValidationError::new("rate_limit.requests", "must be greater than zero"));
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than zero"));
        }
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("{:?} is not a socket address", config.metrics.address),
        ));
    }

    if let Err(e) = Blacklist::compile(&config.blacklist) {
        errors.push(ValidationError::new("blacklist", e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
