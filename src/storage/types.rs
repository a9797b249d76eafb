//! Core data types for the storage layer.
//!
//! - [`Record`]: One collected upstream payload, immutable once written
//! - [`RecordStats`] / [`GroupSummary`]: Aggregates for reporting endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Logical partition of collected records. Valid ids are `>= 1`.
pub type GroupId = i64;

/// Store-assigned, globally monotonic record identifier.
pub type RecordId = i64;

/// Group used when a request does not name one.
pub const DEFAULT_GROUP: GroupId = 1;

/// A collected record stored in the `records` table.
///
/// The payload is whatever JSON the upstream returned; it is never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Auto-incrementing identifier assigned by the store.
    pub id: RecordId,
    /// Group the record was collected for.
    pub group_id: GroupId,
    /// Creation time assigned by the store (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opaque upstream response body.
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
}

impl Record {
    /// Build a record from raw column values.
    pub(crate) fn from_row(
        id: RecordId,
        group_id: GroupId,
        ts_micros: i64,
        payload: &str,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id,
            group_id,
            timestamp: micros_to_datetime(ts_micros)?,
            payload: serde_json::from_str(payload)?,
        })
    }
}

/// Store-wide aggregate used by the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordStats {
    pub total_records: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Per-group aggregate used by the groups endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub total_records: u64,
    pub latest: Option<DateTime<Utc>>,
}

pub(crate) fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {micros}")))
}
