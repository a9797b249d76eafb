//! Configuration module for Harvester.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (url, pool size, channel capacity)
//! - Upstream source (url, interval, timeout, headers)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_BIND, DEFAULT_DATABASE_URL, DEFAULT_PORT};
