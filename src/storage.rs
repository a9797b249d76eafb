//! Storage Layer
//!
//! Append-only SQLite record store with async read/write separation:
//! - **Writer**: Async actor task with exclusive writes fed by a tokio mpsc channel
//! - **Reader**: Shared connection pool for concurrent reads
//!
//! # Components
//!
//! - [`RecordWriter`]: Append facade, awaits the id assigned by the actor
//! - [`RecordReader`]: Query facade (by group, by position, aggregates)
//! - [`StorageAdmin`]: Lifecycle operations
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and shutdown

mod actor;
mod builder;
pub mod db;
mod error;
mod facades;
mod schema;
mod types;

pub use builder::{DEFAULT_CHANNEL_CAPACITY, StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{RecordReader, RecordWriter, StorageAdmin};
pub use types::{DEFAULT_GROUP, GroupId, GroupSummary, Record, RecordId, RecordStats};
