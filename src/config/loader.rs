//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::ValidationError;

/// Environment variables that override file values.
pub const ENV_ORIGIN: &str = "CACHING_PROXY_ORIGIN";
pub const ENV_SECRET: &str = "CACHING_PROXY_SECRET";
pub const ENV_PORT: &str = "CACHING_PROXY_PORT";
pub const ENV_REDIS_PASSWORD: &str = "CACHING_PROXY_REDIS_PASSWORD";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid environment override {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read `path`, apply process environment overrides. Not yet validated.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    Ok(config)
}

/// Deserialize TOML text; missing fields take their defaults.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlay values found through `lookup` onto `config`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(origin) = lookup(ENV_ORIGIN) {
        config.server.origin = origin;
    }
    if let Some(secret) = lookup(ENV_SECRET) {
        config.server.secret = secret;
    }
    if let Some(port) = lookup(ENV_PORT) {
        let port: u16 = port.trim().parse().map_err(|e| ConfigError::Env {
            var: ENV_PORT,
            message: format!("{}", e),
        })?;
        config.server.bind_address = with_port(&config.server.bind_address, port);
    }
    if let Some(password) = lookup(ENV_REDIS_PASSWORD) {
        config.store.password = password;
    }
    Ok(())
}

/// Replace the port of a `host:port` bind address.
pub fn with_port(bind_address: &str, port: u16) -> String {
    let host = match bind_address.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => "0.0.0.0",
    };
    format!("{}:{}", host, port)
}
