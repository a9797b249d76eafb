//! Per-group fetch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::collector::{CollectorError, Source};
use crate::storage::{GroupId, Record, RecordWriter};

/// Fetch once and append the payload for `group_id`.
///
/// Returns the stored record on success; an error means nothing was stored.
pub async fn collect_once(
    source: &dyn Source,
    writer: &RecordWriter,
    group_id: GroupId,
) -> Result<Record, CollectorError> {
    let payload = source.fetch().await?;
    let record = writer.append(group_id, payload).await?;
    tracing::info!(group_id, record_id = record.id, "Collection succeeded");
    Ok(record)
}

/// Everything one fetch loop needs.
pub(crate) struct FetchTask {
    pub group_id: GroupId,
    pub source: Arc<dyn Source>,
    pub writer: RecordWriter,
    pub interval: Duration,
    pub token: CancellationToken,
}

impl FetchTask {
    /// Run until the token is cancelled.
    ///
    /// A failed iteration (fetch or storage) is logged and skipped. Cancellation
    /// is observed while fetching and while sleeping; a cancelled fetch never
    /// produces a record.
    pub async fn run(self) {
        tracing::info!(
            group_id = self.group_id,
            upstream = %self.source.target(),
            "Fetch task started"
        );

        while !self.token.is_cancelled() {
            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                result = self.source.fetch() => result,
            };

            // Cancelled while the fetch was completing: drop the payload.
            if self.token.is_cancelled() {
                break;
            }

            match fetched {
                Ok(payload) => match self.writer.append(self.group_id, payload).await {
                    Ok(record) => {
                        tracing::info!(
                            group_id = self.group_id,
                            record_id = record.id,
                            "Collection succeeded"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            group_id = self.group_id,
                            error = %e,
                            "Failed to store collected payload"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(group_id = self.group_id, error = %e, "Collection failed");
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(group_id = self.group_id, "Fetch task stopped");
    }
}
