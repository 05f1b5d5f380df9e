//! Snapshot store trait definition
//!
//! State is persisted as one [`Snapshot`] document. The state actor builds a
//! snapshot after a burst of changes and hands it to the store from a spawned
//! task, so implementations never block the mailbox.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageResult;
use crate::model::{Alert, AlertId, ProcessSnapshot, Sample, Target, TargetId};

/// Everything needed to rebuild the monitor after a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub targets: Vec<Target>,
    pub samples: Vec<Sample>,
    pub processes: Vec<ProcessSnapshot>,
    pub alerts: Vec<Alert>,
    pub next_target_id: TargetId,
    pub next_alert_id: AlertId,
}

/// Trait for persistent state stores
///
/// Implementations must be `Send + Sync` as they are shared between the state
/// actor and its save tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last persisted snapshot, `None` when nothing was saved yet
    async fn load_all(&self) -> StorageResult<Option<Snapshot>>;

    /// Replace the persisted snapshot
    async fn persist(&self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
