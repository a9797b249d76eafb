//! Collector Layer
//!
//! Polls the upstream on behalf of numbered groups and hands stored records
//! back out in rotation.
//!
//! # Architecture
//!
//! - [`Source`]: upstream seam; [`HttpSource`] is the production implementation
//! - [`CollectionSupervisor`]: one cancellable Tokio task per active group
//! - [`CursorTracker`]: per-group round-robin position over stored records
//!
//! # Example
//!
//! ```rust,no_run
//! use harvester::{CollectionSupervisor, HttpSource, SourceConfig, StorageBuilder};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("sqlite::memory:").build().await?;
//! let config = SourceConfig::new("http://127.0.0.1:9000/data");
//! let source = Arc::new(HttpSource::new(&config)?);
//! let supervisor = CollectionSupervisor::new(
//!     source,
//!     handles.writer.clone(),
//!     config.interval,
//! );
//! supervisor.start(1).await;
//! # Ok(())
//! # }
//! ```

mod cursor;
pub mod http;
mod supervisor;
mod task;
mod traits;

pub use cursor::CursorTracker;
pub use http::{HttpSource, SourceConfig};
pub use supervisor::{CollectionSupervisor, DEFAULT_SHUTDOWN_TIMEOUT, REPORTING_GROUPS};
pub use task::collect_once;
pub use traits::{CollectorError, Source};
