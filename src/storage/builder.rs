//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;

use tokio::task::JoinHandle;

use crate::storage::StorageError;
use crate::storage::actor::DbActor;
use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool, is_memory_url};
use crate::storage::schema::init_schema;
use crate::storage::{RecordReader, RecordWriter, StorageAdmin};

/// Default channel capacity for writer commands.
///
/// Appends wait for their reply, so at most one command per active group is
/// usually in flight; the headroom absorbs bursts of manual collects.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    pool_size: u32,
    channel_capacity: usize,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: DEFAULT_MAX_CONNECTIONS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the connection pool size for readers.
    ///
    /// Ignored for in-memory databases, which always use one connection.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the channel capacity for writer commands.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the storage layer and return handles.
    ///
    /// Creates the database file's parent directory and the schema when missing.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        if !is_memory_url(&self.url) {
            create_parent_dir(&self.url)?;
        }

        let pool = SqlitePool::connect_with_size(&self.url, self.pool_size).await?;
        init_schema(&pool).await?;

        let (actor_handle, tx) = DbActor::spawn(pool.clone(), self.channel_capacity);

        Ok(StorageHandles {
            writer: RecordWriter::new(tx.clone()),
            reader: RecordReader::new(pool.clone()),
            admin: StorageAdmin::new(tx),
            pool,
            actor_handle: Some(actor_handle),
        })
    }
}

/// Create the directory holding the database file named by `url`.
fn create_parent_dir(url: &str) -> Result<(), StorageError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to all storage layer facades.
pub struct StorageHandles {
    /// Append facade.
    pub writer: RecordWriter,
    /// Query facade.
    pub reader: RecordReader,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    pool: SqlitePool,
    actor_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles").finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Sends shutdown command to the writer actor, waits for it to finish and
    /// closes the pool.
    pub async fn shutdown(mut self) -> Result<(), StorageError> {
        self.admin.shutdown().await?;

        if let Some(handle) = self.actor_handle.take() {
            handle
                .await
                .map_err(|e| StorageError::Internal(format!("Failed to join actor task: {e}")))?;
        }

        self.pool.close().await;
        Ok(())
    }
}

impl Drop for StorageHandles {
    fn drop(&mut self) {
        // Dropping the last sender also stops the actor; abort covers live clones.
        if let Some(handle) = self.actor_handle.take() {
            handle.abort();
        }
    }
}
