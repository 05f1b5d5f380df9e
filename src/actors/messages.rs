//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to one actor via mpsc
//! 2. **Replies**: oneshot channels carried inside the command
//! 3. **Events**: Live updates fanned out through the [`EventBroadcaster`]
//!
//! [`EventBroadcaster`]: crate::broadcast::EventBroadcaster

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::error::MonitorResult;
use crate::model::{
    AlertId, AlertView, MethodKind, ProbeResult, ProcessSnapshot, Sample, Status, Target,
    TargetId,
};
use crate::monitors::agent::AgentReport;
use crate::registry::{FleetStats, Page, TargetFilter, TargetSpec, TargetUpdate, TargetView};

/// Commands handled by the StateActor
///
/// Every mutation of targets, samples, processes and alerts goes through this
/// mailbox, so they are applied one at a time in arrival order.
#[derive(Debug)]
pub enum StateCommand {
    CreateTarget {
        spec: TargetSpec,
        respond_to: oneshot::Sender<MonitorResult<Target>>,
    },

    UpdateTarget {
        id: TargetId,
        update: TargetUpdate,
        respond_to: oneshot::Sender<bool>,
    },

    /// Delete a target with its samples, processes and alerts
    DeleteTarget {
        id: TargetId,
        respond_to: oneshot::Sender<bool>,
    },

    GetTarget {
        id: TargetId,
        respond_to: oneshot::Sender<Option<Target>>,
    },

    ListTargets {
        filter: TargetFilter,
        respond_to: oneshot::Sender<Page<TargetView>>,
    },

    /// Targets a checker should probe on this tick
    TargetsOfKind {
        kind: MethodKind,
        respond_to: oneshot::Sender<Vec<Target>>,
    },

    /// Apply one checker result
    ///
    /// Results for targets deleted while the probe was in flight are dropped.
    ApplyProbe {
        target_id: TargetId,
        result: ProbeResult,
    },

    /// Apply an agent push report
    IngestReport {
        secret: Option<String>,
        report: AgentReport,
        respond_to: oneshot::Sender<MonitorResult<Status>>,
    },

    /// Force agents silent for longer than `threshold` offline
    SweepStale {
        now: DateTime<Utc>,
        threshold: chrono::Duration,
        respond_to: oneshot::Sender<usize>,
    },

    LatestSample {
        id: TargetId,
        respond_to: oneshot::Sender<Option<Sample>>,
    },

    History {
        id: TargetId,
        max_count: usize,
        respond_to: oneshot::Sender<Vec<Sample>>,
    },

    Processes {
        id: TargetId,
        respond_to: oneshot::Sender<Vec<ProcessSnapshot>>,
    },

    ListAlerts {
        acknowledged: Option<bool>,
        limit: usize,
        respond_to: oneshot::Sender<Vec<AlertView>>,
    },

    AcknowledgeAlert {
        id: AlertId,
        respond_to: oneshot::Sender<bool>,
    },

    Groups {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    Stats {
        respond_to: oneshot::Sender<FleetStats>,
    },

    /// Flush pending state and stop
    ///
    /// The reply is sent once the final snapshot was handed to the store.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Commands that can be sent to a CheckerActor
#[derive(Debug)]
pub enum CheckerCommand {
    /// Run a full round immediately (bypassing the interval timer)
    ///
    /// Replies with the number of targets probed once every result was
    /// submitted to the state actor.
    CheckNow {
        respond_to: oneshot::Sender<usize>,
    },

    /// Gracefully shut down the checker
    Shutdown,
}

/// Commands that can be sent to the StaleDetectorActor
#[derive(Debug)]
pub enum StaleCommand {
    /// Sweep immediately, replying with the number of agents forced offline
    SweepNow {
        respond_to: oneshot::Sender<usize>,
    },

    Shutdown,
}
