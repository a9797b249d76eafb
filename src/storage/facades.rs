//! User-facing storage facades.
//!
//! Provides ergonomic APIs for storage operations:
//! - `RecordWriter`: Appends via the writer actor
//! - `RecordReader`: Queries records and aggregates from the pool
//! - `StorageAdmin`: Lifecycle control of the writer actor

use sqlx::Row;
use tokio::sync::{mpsc, oneshot};

use crate::storage::StorageError;
use crate::storage::actor::Command;
use crate::storage::db::SqlitePool;
use crate::storage::types::{GroupId, GroupSummary, Record, RecordStats, micros_to_datetime};

// =============================================================================
// Writer
// =============================================================================

/// Record writer.
///
/// Each append waits for the actor to commit, so the returned id is durable.
#[derive(Clone)]
pub struct RecordWriter {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter").finish_non_exhaustive()
    }
}

impl RecordWriter {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Persist a new record for `group_id` and return it as stored.
    pub async fn append(
        &self,
        group_id: GroupId,
        payload: serde_json::Value,
    ) -> Result<Record, StorageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Append {
                group_id,
                payload,
                reply,
            })
            .await
            .map_err(|_| StorageError::ChannelSend)?;
        rx.await.map_err(|_| StorageError::ChannelRecv)?
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Record reader backed by the shared pool.
#[derive(Clone)]
pub struct RecordReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader").finish_non_exhaustive()
    }
}

impl RecordReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records in ascending id order, optionally restricted to one group.
    pub async fn list(&self, group_id: Option<GroupId>) -> Result<Vec<Record>, StorageError> {
        let rows = match group_id {
            Some(group_id) => {
                sqlx::query(
                    "SELECT id, group_id, ts, payload FROM records WHERE group_id = ? ORDER BY id",
                )
                .bind(group_id)
                .fetch_all(self.pool.inner())
                .await?
            }
            None => {
                sqlx::query("SELECT id, group_id, ts, payload FROM records ORDER BY id")
                    .fetch_all(self.pool.inner())
                    .await?
            }
        };

        rows.iter().map(record_from_row).collect()
    }

    /// The `index`-th record (zero-based, id order) of a group.
    pub async fn nth(&self, group_id: GroupId, index: u64) -> Result<Option<Record>, StorageError> {
        let offset = i64::try_from(index)
            .map_err(|_| StorageError::InvalidData(format!("offset out of range: {index}")))?;

        let row = sqlx::query(
            "SELECT id, group_id, ts, payload FROM records
             WHERE group_id = ? ORDER BY id LIMIT 1 OFFSET ?",
        )
        .bind(group_id)
        .bind(offset)
        .fetch_optional(self.pool.inner())
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Number of records, optionally restricted to one group.
    pub async fn count(&self, group_id: Option<GroupId>) -> Result<u64, StorageError> {
        let count: i64 = match group_id {
            Some(group_id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE group_id = ?")
                    .bind(group_id)
                    .fetch_one(self.pool.inner())
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM records")
                    .fetch_one(self.pool.inner())
                    .await?
            }
        };
        Ok(count.max(0) as u64)
    }

    /// Group ids with at least one record, ascending.
    pub async fn distinct_groups(&self) -> Result<Vec<GroupId>, StorageError> {
        let groups: Vec<GroupId> =
            sqlx::query_scalar("SELECT DISTINCT group_id FROM records ORDER BY group_id")
                .fetch_all(self.pool.inner())
                .await?;
        Ok(groups)
    }

    /// Store-wide totals and the earliest/latest collection time.
    pub async fn stats(&self) -> Result<RecordStats, StorageError> {
        let row = sqlx::query("SELECT COUNT(*), MIN(ts), MAX(ts) FROM records")
            .fetch_one(self.pool.inner())
            .await?;

        let total: i64 = row.try_get(0)?;
        let earliest: Option<i64> = row.try_get(1)?;
        let latest: Option<i64> = row.try_get(2)?;

        Ok(RecordStats {
            total_records: total.max(0) as u64,
            earliest: earliest.map(micros_to_datetime).transpose()?,
            latest: latest.map(micros_to_datetime).transpose()?,
        })
    }

    /// Per-group record count and latest collection time, ascending by group.
    pub async fn group_summaries(&self) -> Result<Vec<GroupSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT group_id, COUNT(*), MAX(ts) FROM records GROUP BY group_id ORDER BY group_id",
        )
        .fetch_all(self.pool.inner())
        .await?;

        rows.iter()
            .map(|row| {
                let total: i64 = row.try_get(1)?;
                let latest: Option<i64> = row.try_get(2)?;
                Ok(GroupSummary {
                    group_id: row.try_get(0)?,
                    total_records: total.max(0) as u64,
                    latest: latest.map(micros_to_datetime).transpose()?,
                })
            })
            .collect()
    }

    /// Cheap round-trip used by the readiness endpoint.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Record, StorageError> {
    let payload: String = row.try_get(3)?;
    Record::from_row(row.try_get(0)?, row.try_get(1)?, row.try_get(2)?, &payload)
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration facade.
#[derive(Clone)]
pub struct StorageAdmin {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Ask the writer actor to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }
}
