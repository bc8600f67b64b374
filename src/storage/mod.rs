//! Record store for monitors, check history and incidents
//!
//! This module provides a trait-based abstraction over where monitor records
//! live. The check engine only talks to [`RecordStore`].
//!
//! ## Design
//!
//! - **Trait-based**: `RecordStore` trait allows swapping implementations
//! - **Async**: All operations are async so monitor tasks can share one store
//! - **Independent monitors**: no operation spans more than one monitor
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with WAL and migrations
//! - **In-Memory**: No persistence, for tests or `"backend": "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use uptime_monitoring::storage::{RecordStore, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteBackend::new("./uptime.db").await?;
//!     let monitors = store.list_enabled_monitors().await?;
//!     println!("{} monitors enabled", monitors.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::RecordStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{CheckResult, CheckStats, Incident, Monitor, MonitorId, NewMonitor};

/// Open the record store described by `config`
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn RecordStore>> {
    match config {
        StorageConfig::None => Ok(Arc::new(MemoryBackend::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
