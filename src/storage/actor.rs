//! Writer actor owning all writes, fed by an MPSC channel.
//!
//! Single-writer pattern: one tokio task processes commands in arrival order,
//! so concurrent appends from different groups never interleave and the id
//! sequence stays gap-free.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{GroupId, Record, micros_to_datetime};

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the writer actor.
#[derive(Debug)]
pub enum Command {
    /// Append one record and reply with it as stored.
    Append {
        group_id: GroupId,
        payload: serde_json::Value,
        reply: oneshot::Sender<Result<Record, StorageError>>,
    },
    /// Graceful shutdown.
    Shutdown,
}

// =============================================================================
// Actor
// =============================================================================

/// Database writer actor.
pub struct DbActor {
    pool: SqlitePool,
    rx: mpsc::Receiver<Command>,
}

impl DbActor {
    /// Spawn the writer actor task.
    ///
    /// The schema must already exist on `pool`.
    pub fn spawn(
        pool: SqlitePool,
        channel_capacity: usize,
    ) -> (JoinHandle<()>, mpsc::Sender<Command>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = DbActor { pool, rx };
        let handle = tokio::spawn(actor.run());
        (handle, tx)
    }

    async fn run(mut self) {
        tracing::info!("DbActor started");

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::Append {
                    group_id,
                    payload,
                    reply,
                } => {
                    let result = self.append(group_id, payload).await;
                    if let Err(e) = &result {
                        tracing::error!(group_id, error = %e, "Record append failed");
                    }
                    // Caller may have given up waiting; the record is stored either way.
                    let _ = reply.send(result);
                }
                Command::Shutdown => {
                    tracing::info!("DbActor shutting down");
                    break;
                }
            }
        }

        tracing::info!("DbActor stopped");
    }

    async fn append(
        &self,
        group_id: GroupId,
        payload: serde_json::Value,
    ) -> Result<Record, StorageError> {
        let payload_json = serde_json::to_string(&payload)?;
        let ts = Utc::now().timestamp_micros();
        let timestamp = micros_to_datetime(ts)?;

        let result = sqlx::query("INSERT INTO records (group_id, ts, payload) VALUES (?, ?, ?)")
            .bind(group_id)
            .bind(ts)
            .bind(payload_json)
            .execute(self.pool.inner())
            .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(group_id, record_id = id, "Record appended");
        Ok(Record {
            id,
            group_id,
            timestamp,
            payload,
        })
    }
}
