//! Core collector traits and types.

use std::time::Duration;

use crate::StorageError;
use thiserror::Error;

/// Errors that can occur during collection.
///
/// Everything except [`CollectorError::Storage`] and [`CollectorError::Config`]
/// describes an upstream fetch failure.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Fetch did not complete in time.
    #[error("timeout elapsed after {0:?}")]
    Timeout(Duration),

    /// Response body was not valid JSON.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Failed to persist the fetched payload.
    #[error("failed to store record: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

impl CollectorError {
    /// Whether the error came from the upstream rather than from this process.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status(_) | Self::Timeout(_) | Self::Decode(_)
        )
    }
}

/// Upstream data source polled by fetch tasks.
///
/// One call is one best-effort fetch; implementations never retry.
#[async_trait::async_trait]
pub trait Source: Send + Sync + 'static {
    /// Human-readable identity of the upstream, used in logs.
    fn target(&self) -> &str;

    /// Fetch one payload.
    ///
    /// # Returns
    ///
    /// - `Ok(value)`: upstream answered with success and a decodable JSON body
    /// - `Err(_)`: non-success status, timeout, transport fault or decode error
    async fn fetch(&self) -> Result<serde_json::Value, CollectorError>;
}
