//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → [command-line overrides applied by main]
//!     → validation.rs (semantic checks, blacklist compilation)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{read_config, ConfigError};
pub use schema::{
    LogFormat, LoggingConfig, MetricsConfig, OriginConfig, ProxyConfig, RateLimitConfig,
    ServerConfig, StoreBackend, StoreConfig,
};
pub use validation::{validate_config, ValidationError};
