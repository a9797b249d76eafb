//! HTTP upstream fetcher.
//!
//! Performs one `GET` against the configured URL and decodes the body as JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::collector::{CollectorError, Source};
use crate::config::expand_env_vars;

/// Default upstream URL.
pub const DEFAULT_URL: &str = "https://www.example.com";

/// Default collection interval (1 second).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default request timeout (5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Upstream source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Target URL (HTTP or HTTPS). Supports `${VAR}` expansion.
    #[serde(default = "default_url")]
    pub url: String,
    /// Pause between two fetches of the same group (default: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Bound on one fetch including the body read (default: 5s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Request headers with environment variable substitution support.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl SourceConfig {
    /// Create a source configuration with default timing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }

    /// Set the collection interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a single request header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// HTTP upstream source.
pub struct HttpSource {
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    client: Client,
}

impl HttpSource {
    /// Create a new HTTP source.
    ///
    /// Environment variables in the URL and header values are expanded once here.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: expand_env_vars(&config.url),
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), expand_env_vars(v)))
                .collect(),
            timeout: config.timeout,
            client,
        })
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Source for HttpSource {
    fn target(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<serde_json::Value, CollectorError> {
        let mut request = self.client.get(&self.url);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(CollectorError::Status(status.as_u16()));
            }
            let body = response.bytes().await?;
            Ok::<_, CollectorError>(serde_json::from_slice::<serde_json::Value>(&body)?)
        };

        match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Timeout(self.timeout)),
        }
    }
}
