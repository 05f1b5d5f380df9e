//! JSON file snapshot store
//!
//! The whole state lives in one JSON document. Writes go to a sibling
//! temporary file that is renamed over the document, so a crash mid-write
//! leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::backend::{Snapshot, SnapshotStore};
use super::error::StorageResult;

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_all(&self) -> StorageResult<Option<Snapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no snapshot file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&content)?;
        debug!(
            "loaded {} targets, {} samples, {} alerts",
            snapshot.targets.len(),
            snapshot.samples.len(),
            snapshot.alerts.len()
        );
        Ok(Some(snapshot))
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn persist(&self, snapshot: &Snapshot) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let document = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, document).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!("snapshot written");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}
