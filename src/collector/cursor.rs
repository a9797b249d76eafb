//! Per-group round-robin read cursor.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::Mutex;

use crate::storage::{GroupId, Record, RecordReader, StorageError};

/// Hands out a group's stored records one at a time, in id order, wrapping
/// back to the first after the last.
///
/// Positions live in memory only and start at 0 for every group. Concurrent
/// callers are serialized so each call observes and advances a distinct
/// position.
pub struct CursorTracker {
    reader: RecordReader,
    positions: Mutex<HashMap<GroupId, u64>>,
}

impl CursorTracker {
    pub fn new(reader: RecordReader) -> Self {
        Self {
            reader,
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the record at the group's cursor and advance it.
    ///
    /// `Ok(None)` when the group has no records; the cursor is left untouched
    /// in that case. A cursor that has run past the end (or past a shrunken
    /// set) restarts at 0.
    pub async fn next(&self, group_id: GroupId) -> Result<Option<Record>, StorageError> {
        let mut positions = self.positions.lock().await;

        let total = self.reader.count(Some(group_id)).await?;
        if total == 0 {
            return Ok(None);
        }

        let mut index = positions.get(&group_id).copied().unwrap_or(0);
        if index >= total {
            index = 0;
        }

        let record = self.reader.nth(group_id, index).await?.ok_or_else(|| {
            StorageError::InvalidData(format!(
                "group {group_id} has {total} records but none at index {index}"
            ))
        })?;

        positions.insert(group_id, index + 1);
        tracing::debug!(group_id, index, record_id = record.id, "Cursor advanced");
        Ok(Some(record))
    }

    /// Current index for `group_id` (0 if never read).
    pub async fn index(&self, group_id: GroupId) -> u64 {
        self.positions
            .lock()
            .await
            .get(&group_id)
            .copied()
            .unwrap_or(0)
    }

    /// All groups that have been read at least once, with their positions.
    pub async fn snapshot(&self) -> BTreeMap<GroupId, u64> {
        self.positions
            .lock()
            .await
            .iter()
            .map(|(g, i)| (*g, *i))
            .collect()
    }
}

impl std::fmt::Debug for CursorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorTracker")
            .field(
                "groups",
                &self.positions.try_lock().map(|p| p.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}
