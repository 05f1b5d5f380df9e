//! In-memory snapshot store (no persistence)
//!
//! Keeps the last persisted snapshot in process memory. Used when storage is
//! disabled and in tests that want to observe what was saved.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::trace;

use super::backend::{Snapshot, SnapshotStore};
use super::error::StorageResult;

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    persist_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a snapshot, as if persisted by an earlier run
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            persist_count: AtomicUsize::new(0),
        }
    }

    /// Number of completed `persist` calls
    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }

    /// Last persisted snapshot
    pub fn last(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load_all(&self) -> StorageResult<Option<Snapshot>> {
        Ok(self.last())
    }

    async fn persist(&self, snapshot: &Snapshot) -> StorageResult<()> {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = Some(snapshot.clone());
        }
        let count = self.persist_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("kept snapshot in memory ({count} saves)");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
