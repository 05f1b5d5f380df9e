//! Snapshot persistence
//!
//! ## Backends
//!
//! - **JSON** (default): one document on disk, `./data/db.json`
//! - **SQLite**: the same document in a key/value table (feature `storage-sqlite`)
//! - **In-Memory**: no persistence, for tests or when storage is disabled

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod backend;
pub mod error;
pub mod json;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{Snapshot, SnapshotStore};
pub use error::{StorageError, StorageResult};
pub use json::JsonFileStore;
pub use memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;

/// Open the store selected in the configuration
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn SnapshotStore>> {
    let store: Arc<dyn SnapshotStore> = match config {
        StorageConfig::None => Arc::new(MemoryStore::new()),
        StorageConfig::Json { path } => Arc::new(JsonFileStore::new(path)),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Arc::new(SqliteStore::new(path).await?),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            return Err(StorageError::InvalidConfig(
                "sqlite storage requires the storage-sqlite feature".to_string(),
            ));
        }
    };

    info!("using {} snapshot store", store.backend_name());
    Ok(store)
}
