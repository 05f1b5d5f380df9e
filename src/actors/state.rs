//! StateActor - Single owner of targets, samples, processes and alerts
//!
//! Checkers, agent reports, the stale detector and callers all talk to this
//! actor through its mailbox, so every mutation is applied in arrival order
//! and no locks are needed.
//!
//! ## Message Flow
//!
//! ```text
//! CheckerActor ──ApplyProbe──┐
//! Agent report ──IngestReport┼──→ StateActor ──→ LiveEvent (broadcast)
//! StaleDetector ─SweepStale──┘        │
//!                                     └──→ debounced snapshot ──→ SnapshotStore
//! ```
//!
//! ## Persistence
//!
//! The first change after a save arms a timer of `save_debounce`. When it
//! fires the current state is snapshotted and handed to the store from a
//! spawned task. Only one save runs at a time; changes made meanwhile are
//! picked up by the next one. A failed save keeps the state dirty and is
//! retried after another debounce period. Shutdown always writes a final
//! snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertSink, breach_message, down_message, failure_detail, severity_of};
use crate::broadcast::{EventBroadcaster, LiveEvent, transition_message};
use crate::config::Thresholds;
use crate::error::{MonitorError, MonitorResult};
use crate::model::{
    AlertId, AlertView, Measurements, MethodKind, ProbeResult, ProcessSnapshot, Sample, Status,
    Target, TargetId,
};
use crate::monitors::agent::AgentReport;
use crate::monitors::status::{decide, threshold_breaches};
use crate::registry::{
    FleetStats, Page, TargetFilter, TargetRegistry, TargetSpec, TargetUpdate, TargetView,
};
use crate::storage::{Snapshot, SnapshotStore, StorageResult};
use crate::store::{MetricStore, ProcessStore};

use super::messages::StateCommand;

pub struct StateActor {
    registry: TargetRegistry,
    metrics: MetricStore,
    processes: ProcessStore,
    alerts: AlertSink,

    thresholds: Thresholds,
    events: EventBroadcaster,

    /// Command receiver
    command_rx: mpsc::Receiver<StateCommand>,

    store: Arc<dyn SnapshotStore>,
    save_debounce: Duration,
    /// When the pending save fires, `None` when nothing is scheduled
    save_at: Option<Instant>,
    /// Changes not yet handed to the store
    dirty: bool,
    /// In-flight save (at most one)
    saves: JoinSet<StorageResult<()>>,
}

impl StateActor {
    /// Create the actor, restoring state from `snapshot` when given
    pub fn new(
        snapshot: Option<Snapshot>,
        store: Arc<dyn SnapshotStore>,
        events: EventBroadcaster,
        thresholds: Thresholds,
        save_debounce: Duration,
        command_rx: mpsc::Receiver<StateCommand>,
    ) -> Self {
        let snapshot = snapshot.unwrap_or_default();

        Self {
            registry: TargetRegistry::restore(snapshot.targets, snapshot.next_target_id),
            metrics: MetricStore::restore(snapshot.samples),
            processes: ProcessStore::restore(snapshot.processes),
            alerts: AlertSink::restore(snapshot.alerts, snapshot.next_alert_id),
            thresholds,
            events,
            command_rx,
            store,
            save_debounce,
            save_at: None,
            dirty: false,
            saves: JoinSet::new(),
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle was dropped.
    #[instrument(skip(self), fields(targets = self.registry.len()))]
    pub async fn run(mut self) {
        debug!("starting state actor");

        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    if let StateCommand::Shutdown { respond_to } = cmd {
                        debug!("received shutdown command");
                        shutdown_reply = Some(respond_to);
                        break;
                    }
                    self.handle_command(cmd);
                }

                // Debounce elapsed
                _ = sleep_until(self.save_at.unwrap_or_else(Instant::now)), if self.save_at.is_some() => {
                    self.save_at = None;
                    self.start_save();
                }

                Some(joined) = self.saves.join_next(), if !self.saves.is_empty() => {
                    self.finish_save(joined);
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        while let Some(joined) = self.saves.join_next().await {
            self.finish_save(joined);
        }

        let snapshot = self.snapshot();
        match self.store.persist(&snapshot).await {
            Ok(()) => info!(
                "final snapshot saved ({} targets, {} samples)",
                snapshot.targets.len(),
                snapshot.samples.len()
            ),
            Err(e) => error!("failed to save final snapshot: {e}"),
        }

        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(());
        }

        debug!("state actor stopped");
    }

    fn handle_command(&mut self, cmd: StateCommand) {
        match cmd {
            StateCommand::CreateTarget { spec, respond_to } => {
                let _ = respond_to.send(self.create_target(spec));
            }

            StateCommand::UpdateTarget {
                id,
                update,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_target(id, update));
            }

            StateCommand::DeleteTarget { id, respond_to } => {
                let _ = respond_to.send(self.delete_target(id));
            }

            StateCommand::GetTarget { id, respond_to } => {
                let _ = respond_to.send(self.registry.get(id).cloned());
            }

            StateCommand::ListTargets { filter, respond_to } => {
                let _ = respond_to.send(self.list_targets(&filter));
            }

            StateCommand::TargetsOfKind { kind, respond_to } => {
                let _ = respond_to.send(self.registry.of_kind(kind));
            }

            StateCommand::ApplyProbe { target_id, result } => {
                self.apply_probe(target_id, result);
            }

            StateCommand::IngestReport {
                secret,
                report,
                respond_to,
            } => {
                let _ = respond_to.send(self.ingest_report(secret.as_deref(), report));
            }

            StateCommand::SweepStale {
                now,
                threshold,
                respond_to,
            } => {
                let _ = respond_to.send(self.sweep_stale(now, threshold));
            }

            StateCommand::LatestSample { id, respond_to } => {
                let _ = respond_to.send(self.metrics.latest(id).cloned());
            }

            StateCommand::History {
                id,
                max_count,
                respond_to,
            } => {
                let _ = respond_to.send(self.metrics.history(id, max_count));
            }

            StateCommand::Processes { id, respond_to } => {
                let _ = respond_to.send(self.processes.latest(id));
            }

            StateCommand::ListAlerts {
                acknowledged,
                limit,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_alerts(acknowledged, limit));
            }

            StateCommand::AcknowledgeAlert { id, respond_to } => {
                let acknowledged = self.alerts.acknowledge(id);
                if acknowledged {
                    self.mark_dirty();
                }
                let _ = respond_to.send(acknowledged);
            }

            StateCommand::Groups { respond_to } => {
                let _ = respond_to.send(self.registry.groups());
            }

            StateCommand::Stats { respond_to } => {
                let _ = respond_to.send(FleetStats {
                    counts: self.registry.status_counts(),
                    usage: self.metrics.fleet_usage(),
                    active_alerts: self.alerts.unacknowledged(),
                    groups: self.registry.group_counts(),
                });
            }

            // handled by the run loop
            StateCommand::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    fn create_target(&mut self, spec: TargetSpec) -> MonitorResult<Target> {
        let target = self.registry.create(spec)?;
        info!(
            "registered target {} ({} via {})",
            target.id,
            target.hostname,
            target.kind()
        );
        self.mark_dirty();
        Ok(target)
    }

    fn update_target(&mut self, id: TargetId, update: TargetUpdate) -> bool {
        let updated = self.registry.update(id, update);
        if updated {
            debug!("updated target {id}");
            self.mark_dirty();
        }
        updated
    }

    /// Remove a target together with everything recorded for it
    fn delete_target(&mut self, id: TargetId) -> bool {
        let Some(target) = self.registry.delete(id) else {
            return false;
        };

        let samples = self.metrics.remove_target(id);
        let processes = self.processes.remove_target(id);
        self.alerts.remove_target(id);

        info!(
            "deleted target {id} ({}), dropped {samples} samples and {processes} processes",
            target.hostname
        );
        self.mark_dirty();
        true
    }

    fn list_targets(&self, filter: &TargetFilter) -> Page<TargetView> {
        let page = self.registry.list(filter);
        Page {
            data: page
                .data
                .into_iter()
                .map(|target| TargetView {
                    latest: self.metrics.latest(target.id).cloned(),
                    target,
                })
                .collect(),
            pagination: page.pagination,
        }
    }

    fn list_alerts(&self, acknowledged: Option<bool>, limit: usize) -> Vec<AlertView> {
        self.alerts
            .list(acknowledged, limit)
            .into_iter()
            .map(|alert| {
                let (hostname, address) = self
                    .registry
                    .get(alert.target_id)
                    .map(|t| (t.hostname.clone(), t.address.clone()))
                    .unwrap_or_default();
                AlertView {
                    alert,
                    hostname,
                    address,
                }
            })
            .collect()
    }

    /// Feed one result through the status engine
    ///
    /// Returns the new status, `None` when the result was dropped.
    fn apply_probe(&mut self, target_id: TargetId, result: ProbeResult) -> Option<Status> {
        let Some(target) = self.registry.get(target_id).cloned() else {
            debug!("dropping result for deleted target {target_id}");
            return None;
        };

        if result.measurements.kind() != target.kind() {
            debug!(
                "dropping {} result for target {target_id} now monitored via {}",
                result.measurements.kind(),
                target.kind()
            );
            return None;
        }

        let decision = decide(target.status, &result, &self.thresholds);
        let seen_at = result.reachable.then_some(result.timestamp);
        self.registry.set_status(target_id, decision.status, seen_at);

        let sample = Sample::from_probe(target_id, result);
        let stored = self.metrics.append(sample.clone());

        if let Some(kind) = decision.alert {
            let detail = failure_detail(&sample.measurements);
            self.alerts.record(
                target_id,
                kind,
                severity_of(kind),
                down_message(kind, &target, detail.as_deref()),
                sample.timestamp,
            );
        }

        if decision.transitioned {
            let message = transition_message(&target, decision.status, Some(&sample.measurements));
            info!("{message}");
            self.events.publish(LiveEvent::StatusChange {
                target_id,
                hostname: target.hostname.clone(),
                previous: target.status,
                status: decision.status,
                message,
            });
        }

        if stored {
            trace!("applied sample to target {target_id}");
            self.events.publish(LiveEvent::MetricUpdate {
                target_id,
                hostname: target.hostname,
                status: decision.status,
                timestamp: sample.timestamp,
                reachable: sample.reachable,
                measurements: sample.measurements,
            });
        }

        self.mark_dirty();
        Some(decision.status)
    }

    fn ingest_report(
        &mut self,
        secret: Option<&str>,
        report: AgentReport,
    ) -> MonitorResult<Status> {
        let secret = secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(MonitorError::MissingSecret)?;

        let target = self
            .registry
            .find_by_secret(secret)
            .cloned()
            .ok_or(MonitorError::UnknownSecret)?;

        let now = Utc::now();

        let hardware = report.merge_hardware(target.hardware);
        if hardware != target.hardware {
            debug!("hardware of target {} is now {:?}", target.id, hardware);
            self.registry.set_hardware(target.id, hardware);
        }

        if let Some(batch) = report.process_batch(target.id, now) {
            trace!("replacing {} processes of target {}", batch.len(), target.id);
            self.processes.replace(target.id, batch);
        }

        let metrics = report.metrics();
        for kind in threshold_breaches(&metrics, &self.thresholds) {
            self.alerts.record(
                target.id,
                kind,
                severity_of(kind),
                breach_message(kind, &target, &metrics),
                now,
            );
        }

        let result = ProbeResult {
            reachable: true,
            timestamp: now,
            measurements: Measurements::Agent(metrics),
        };

        self.apply_probe(target.id, result)
            .ok_or(MonitorError::TargetNotFound(target.id))
    }

    /// Force agents that stopped reporting offline
    fn sweep_stale(&mut self, now: DateTime<Utc>, threshold: chrono::Duration) -> usize {
        let stale: Vec<Target> = self
            .registry
            .of_kind(MethodKind::Agent)
            .into_iter()
            .filter(|t| matches!(t.status, Status::Online | Status::Warning))
            .filter(|t| t.last_seen.is_some_and(|seen| now - seen > threshold))
            .collect();

        for target in &stale {
            self.registry.set_status(target.id, Status::Offline, None);

            let message = transition_message(target, Status::Offline, None);
            warn!("{message}");
            self.events.publish(LiveEvent::StatusChange {
                target_id: target.id,
                hostname: target.hostname.clone(),
                previous: target.status,
                status: Status::Offline,
                message,
            });
        }

        if !stale.is_empty() {
            self.mark_dirty();
        }
        stale.len()
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        if self.save_at.is_none() {
            self.save_at = Some(Instant::now() + self.save_debounce);
        }
    }

    fn start_save(&mut self) {
        if !self.dirty {
            return;
        }
        if !self.saves.is_empty() {
            trace!("save already in flight, deferring");
            return;
        }

        let snapshot = self.snapshot();
        self.dirty = false;

        let store = Arc::clone(&self.store);
        self.saves
            .spawn(async move { store.persist(&snapshot).await });
    }

    fn finish_save(&mut self, joined: Result<StorageResult<()>, JoinError>) {
        match joined {
            Ok(Ok(())) => debug!("snapshot saved"),
            Ok(Err(e)) => {
                error!("failed to save snapshot: {e}");
                self.dirty = true;
            }
            Err(e) => {
                error!("snapshot save task failed: {e}");
                self.dirty = true;
            }
        }

        if self.dirty && self.save_at.is_none() {
            self.save_at = Some(Instant::now() + self.save_debounce);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            targets: self.registry.snapshot(),
            samples: self.metrics.snapshot(),
            processes: self.processes.snapshot(),
            alerts: self.alerts.snapshot(),
            next_target_id: self.registry.next_id(),
            next_alert_id: self.alerts.next_id(),
        }
    }
}

/// Handle for talking to the StateActor
///
/// Cheap to clone; every clone feeds the same mailbox.
#[derive(Clone)]
pub struct StateHandle {
    sender: mpsc::Sender<StateCommand>,
}

impl StateHandle {
    /// Spawn a new state actor
    pub fn spawn(
        snapshot: Option<Snapshot>,
        store: Arc<dyn SnapshotStore>,
        events: EventBroadcaster,
        thresholds: Thresholds,
        save_debounce: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let actor = StateActor::new(
            snapshot,
            store,
            events,
            thresholds,
            save_debounce,
            cmd_rx,
        );

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> StateCommand,
    ) -> MonitorResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(command(tx)).await?;
        Ok(rx.await?)
    }

    pub async fn create_target(&self, spec: TargetSpec) -> MonitorResult<Target> {
        self.request(|respond_to| StateCommand::CreateTarget { spec, respond_to })
            .await?
    }

    /// Returns `false` when the target does not exist
    pub async fn update_target(&self, id: TargetId, update: TargetUpdate) -> MonitorResult<bool> {
        self.request(|respond_to| StateCommand::UpdateTarget {
            id,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete_target(&self, id: TargetId) -> MonitorResult<bool> {
        self.request(|respond_to| StateCommand::DeleteTarget { id, respond_to })
            .await
    }

    pub async fn get_target(&self, id: TargetId) -> MonitorResult<Option<Target>> {
        self.request(|respond_to| StateCommand::GetTarget { id, respond_to })
            .await
    }

    pub async fn list_targets(&self, filter: TargetFilter) -> MonitorResult<Page<TargetView>> {
        self.request(|respond_to| StateCommand::ListTargets { filter, respond_to })
            .await
    }

    pub async fn targets_of_kind(&self, kind: MethodKind) -> MonitorResult<Vec<Target>> {
        self.request(|respond_to| StateCommand::TargetsOfKind { kind, respond_to })
            .await
    }

    /// Queue a checker result; does not wait for it to be applied
    pub async fn apply_probe(&self, target_id: TargetId, result: ProbeResult) -> MonitorResult<()> {
        self.sender
            .send(StateCommand::ApplyProbe { target_id, result })
            .await?;
        Ok(())
    }

    /// Apply an agent report, returning the agent's new status
    pub async fn ingest_report(
        &self,
        secret: Option<String>,
        report: AgentReport,
    ) -> MonitorResult<Status> {
        self.request(|respond_to| StateCommand::IngestReport {
            secret,
            report,
            respond_to,
        })
        .await?
    }

    pub async fn sweep_stale(
        &self,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> MonitorResult<usize> {
        self.request(|respond_to| StateCommand::SweepStale {
            now,
            threshold,
            respond_to,
        })
        .await
    }

    pub async fn latest_sample(&self, id: TargetId) -> MonitorResult<Option<Sample>> {
        self.request(|respond_to| StateCommand::LatestSample { id, respond_to })
            .await
    }

    /// Up to `max_count` most recent samples, oldest first
    pub async fn history(&self, id: TargetId, max_count: usize) -> MonitorResult<Vec<Sample>> {
        self.request(|respond_to| StateCommand::History {
            id,
            max_count,
            respond_to,
        })
        .await
    }

    pub async fn processes(&self, id: TargetId) -> MonitorResult<Vec<ProcessSnapshot>> {
        self.request(|respond_to| StateCommand::Processes { id, respond_to })
            .await
    }

    pub async fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> MonitorResult<Vec<AlertView>> {
        self.request(|respond_to| StateCommand::ListAlerts {
            acknowledged,
            limit,
            respond_to,
        })
        .await
    }

    pub async fn acknowledge_alert(&self, id: AlertId) -> MonitorResult<bool> {
        self.request(|respond_to| StateCommand::AcknowledgeAlert { id, respond_to })
            .await
    }

    pub async fn groups(&self) -> MonitorResult<Vec<String>> {
        self.request(|respond_to| StateCommand::Groups { respond_to })
            .await
    }

    pub async fn stats(&self) -> MonitorResult<FleetStats> {
        self.request(|respond_to| StateCommand::Stats { respond_to })
            .await
    }

    /// Stop the actor after writing a final snapshot
    pub async fn shutdown(&self) -> MonitorResult<()> {
        self.request(|respond_to| StateCommand::Shutdown { respond_to })
            .await
    }
}
