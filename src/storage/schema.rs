//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// SQL statement for creating the records table.
///
/// `AUTOINCREMENT` keeps ids strictly monotonic even across deletes made by
/// external tooling. `ts` holds Unix microseconds; `payload` the JSON text.
pub const RECORDS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL DEFAULT 1,
    ts       INTEGER NOT NULL,
    payload  TEXT NOT NULL
);
"#;

/// Secondary index for per-group queries.
pub const RECORDS_GROUP_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_group_id ON records (group_id, id);
"#;

/// Initialize the database schema.
///
/// Creates the table and index if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(RECORDS_TABLE_DDL).execute(pool.inner()).await?;
    sqlx::query(RECORDS_GROUP_INDEX_DDL)
        .execute(pool.inner())
        .await?;

    tracing::info!("Database schema initialized");
    Ok(())
}
