//! Harvester - per-group upstream collector
//!
//! Polls one upstream HTTP JSON endpoint on behalf of numbered groups, stores
//! every response as an immutable record, and serves the records back over a
//! small HTTP API with a round-robin "current record" cursor per group.
//!
//! # Architecture
//!
//! - **Storage**: SQLite record store with a single-writer actor and pooled readers
//! - **Collector**: one cancellable fetch task per active group, plus the cursor
//! - **Server**: axum JSON API
//! - **Config**: YAML configuration with CLI/env overrides in the binary
//!
//! # Example
//!
//! ```rust,no_run
//! use harvester::{CollectionSupervisor, CursorTracker, HttpSource, SourceConfig, StorageBuilder};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("sqlite:data/harvester.db?mode=rwc").build().await?;
//! let config = SourceConfig::new("https://api.example.com/feed");
//! let supervisor = CollectionSupervisor::new(
//!     Arc::new(HttpSource::new(&config)?),
//!     handles.writer.clone(),
//!     config.interval,
//! );
//! let cursor = CursorTracker::new(handles.reader.clone());
//!
//! supervisor.start(1).await;
//! if let Some(record) = cursor.next(1).await? {
//!     println!("{}", record.payload);
//! }
//! supervisor.shutdown().await;
//! handles.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod server;
pub mod storage;

pub use collector::{
    CollectionSupervisor, CollectorError, CursorTracker, HttpSource, Source, SourceConfig,
};
pub use config::{AppConfig, ConfigError};
pub use storage::{
    DEFAULT_GROUP, GroupId, Record, RecordId, RecordReader, RecordWriter, StorageBuilder,
    StorageError, StorageHandles,
};
