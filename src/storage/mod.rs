//! Alert stores
//!
//! A trait-based abstraction for keeping the history of raised alerts.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database behind the `storage-sqlite` feature
//! - **In-Memory**: Bounded ring buffer, used for tests or when persistence is off

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{AlertStore, HealthStatus};
pub use error::{StorageError, StorageResult};
pub use schema::AlertRecord;

use crate::config::StorageConfig;

/// Build the store selected by the configuration
pub async fn open_store(config: &StorageConfig) -> StorageResult<Box<dyn AlertStore>> {
    match config {
        StorageConfig::Memory { capacity } => Ok(Box::new(memory::MemoryAlertStore::new(*capacity))),

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            Ok(Box::new(sqlite::SqliteAlertStore::new(path).await?))
        }

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "sqlite support not compiled in (enable the storage-sqlite feature)".to_string(),
        )),
    }
}
