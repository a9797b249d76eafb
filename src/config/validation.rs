//! Parsing helpers shared by config loading and the CLI.

use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for [`AppConfig`](super::AppConfig).
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value parsed but is not acceptable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// `${NAME}` or `${NAME:-fallback}`.
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("valid env reference regex")
});

/// Parse a collection interval or timeout such as `500ms`, `1s` or `1m 30s`.
///
/// Zero is rejected.
///
/// ```
/// use harvester::config::parse_duration;
///
/// assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
/// assert!(parse_duration("0s").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let duration = humantime::parse_duration(s)
        .map_err(|e| ConfigError::invalid(format!("invalid duration '{s}': {e}")))?;
    if duration.is_zero() {
        return Err(ConfigError::invalid(format!("duration '{s}' must be non-zero")));
    }
    Ok(duration)
}

/// Substitute environment references in an upstream URL or header value.
///
/// `${NAME}` expands to the variable's value, or to nothing when unset.
/// `${NAME:-fallback}` uses `fallback` when the variable is unset or empty.
pub fn expand_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &Captures| {
            let value = std::env::var(&caps[1]).ok().filter(|v| !v.is_empty());
            match (value, caps.get(2)) {
                (Some(value), _) => value,
                (None, Some(fallback)) => fallback.as_str().to_string(),
                (None, None) => String::new(),
            }
        })
        .into_owned()
}
