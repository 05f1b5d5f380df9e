//! Monitor service
//!
//! Owns the actors and exposes the operations callers use: target CRUD, agent
//! ingestion, queries, live event subscription and a graceful shutdown.
//!
//! ```text
//! Monitor::start(config)
//!   ├── load snapshot (a failing store starts empty)
//!   ├── spawn StateActor
//!   ├── seed configured targets (only into an empty registry)
//!   ├── spawn one CheckerActor per scheduled method
//!   └── spawn StaleDetectorActor
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::{CheckerHandle, StaleDetectorHandle, StateHandle};
use crate::broadcast::{EventBroadcaster, LiveEvent};
use crate::checkers::{Checker, DnsChecker, HttpChecker, IcmpChecker, PortChecker};
use crate::config::Config;
use crate::error::MonitorResult;
use crate::model::{
    AlertId, AlertView, MethodKind, ProcessSnapshot, Sample, Status, Target, TargetId,
};
use crate::monitors::agent::AgentReport;
use crate::registry::{FleetStats, Page, TargetFilter, TargetSpec, TargetUpdate, TargetView};
use crate::storage::{MemoryStore, SnapshotStore, open_store};

/// Builder for a [`Monitor`] with injected store or checkers
pub struct MonitorBuilder {
    config: Config,
    store: Option<Arc<dyn SnapshotStore>>,
    checkers: HashMap<MethodKind, Arc<dyn Checker>>,
}

impl MonitorBuilder {
    /// Use this store instead of the one named in the configuration
    pub fn store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the built-in checker of the checker's method
    pub fn checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checkers.insert(checker.kind(), checker);
        self
    }

    #[instrument(skip_all)]
    pub async fn start(self) -> Result<Monitor> {
        let MonitorBuilder {
            config,
            store,
            mut checkers,
        } = self;

        let store = match store {
            Some(store) => store,
            None => match open_store(&config.storage).await {
                Ok(store) => store,
                Err(e) => {
                    error!("failed to open snapshot store, state will not be persisted: {e}");
                    Arc::new(MemoryStore::new())
                }
            },
        };

        let snapshot = match store.load_all().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("failed to load snapshot, starting empty: {e}");
                None
            }
        };
        let seed = snapshot.as_ref().is_none_or(|s| s.targets.is_empty());

        let events = EventBroadcaster::new(config.event_capacity);
        let state = StateHandle::spawn(
            snapshot,
            store,
            events.clone(),
            config.thresholds,
            config.save_debounce(),
        );

        if seed {
            for spec in config.targets.iter().flatten() {
                match state.create_target(spec.clone()).await {
                    Ok(target) => debug!("seeded target {} ({})", target.id, target.hostname),
                    Err(e) => warn!("skipping configured target {}: {e}", spec.hostname),
                }
            }
        }

        let builtin: [Arc<dyn Checker>; 4] = [
            Arc::new(IcmpChecker::new(&config.probes)),
            Arc::new(HttpChecker::new(&config.probes).context("failed to build HTTP client")?),
            Arc::new(PortChecker::new(&config.probes)),
            Arc::new(DnsChecker::new(&config.probes)),
        ];
        for checker in builtin {
            checkers.entry(checker.kind()).or_insert(checker);
        }

        let mut handles = Vec::new();
        for (kind, checker) in checkers {
            let Some(schedule) = config.scheduler.schedule_for(kind) else {
                warn!("no schedule for {kind} checks, checker not started");
                continue;
            };
            handles.push(CheckerHandle::spawn(
                checker,
                schedule,
                config.scheduler.max_concurrent_probes,
                state.clone(),
            ));
        }

        let stale = StaleDetectorHandle::spawn(config.stale, state.clone());

        info!("monitor started with {} checkers", handles.len());

        Ok(Monitor {
            state,
            checkers: handles,
            stale,
            events,
        })
    }
}

/// Running monitor
///
/// Dropping it without [`Monitor::shutdown`] leaves unsaved changes unsaved.
pub struct Monitor {
    state: StateHandle,
    checkers: Vec<CheckerHandle>,
    stale: StaleDetectorHandle,
    events: EventBroadcaster,
}

impl Monitor {
    pub fn builder(config: Config) -> MonitorBuilder {
        MonitorBuilder {
            config,
            store: None,
            checkers: HashMap::new(),
        }
    }

    /// Start with the store and checkers named in the configuration
    pub async fn start(config: Config) -> Result<Self> {
        Self::builder(config).start().await
    }

    pub async fn create_target(&self, spec: TargetSpec) -> MonitorResult<Target> {
        self.state.create_target(spec).await
    }

    pub async fn update_target(&self, id: TargetId, update: TargetUpdate) -> MonitorResult<bool> {
        self.state.update_target(id, update).await
    }

    pub async fn delete_target(&self, id: TargetId) -> MonitorResult<bool> {
        self.state.delete_target(id).await
    }

    pub async fn get_target(&self, id: TargetId) -> MonitorResult<Option<Target>> {
        self.state.get_target(id).await
    }

    pub async fn list_targets(&self, filter: TargetFilter) -> MonitorResult<Page<TargetView>> {
        self.state.list_targets(filter).await
    }

    pub async fn latest_sample(&self, id: TargetId) -> MonitorResult<Option<Sample>> {
        self.state.latest_sample(id).await
    }

    pub async fn history(&self, id: TargetId, max_count: usize) -> MonitorResult<Vec<Sample>> {
        self.state.history(id, max_count).await
    }

    pub async fn processes(&self, id: TargetId) -> MonitorResult<Vec<ProcessSnapshot>> {
        self.state.processes(id).await
    }

    pub async fn list_alerts(
        &self,
        acknowledged: Option<bool>,
        limit: usize,
    ) -> MonitorResult<Vec<AlertView>> {
        self.state.list_alerts(acknowledged, limit).await
    }

    pub async fn acknowledge_alert(&self, id: AlertId) -> MonitorResult<bool> {
        self.state.acknowledge_alert(id).await
    }

    pub async fn groups(&self) -> MonitorResult<Vec<String>> {
        self.state.groups().await
    }

    pub async fn stats(&self) -> MonitorResult<FleetStats> {
        self.state.stats().await
    }

    /// Apply a report pushed by the agent owning `secret`
    pub async fn ingest_report(
        &self,
        secret: Option<&str>,
        report: AgentReport,
    ) -> MonitorResult<Status> {
        self.state
            .ingest_report(secret.map(str::to_string), report)
            .await
    }

    /// Run one round of the given method's checker now
    pub async fn check_now(&self, kind: MethodKind) -> Result<usize> {
        let handle = self
            .checkers
            .iter()
            .find(|h| h.kind == kind)
            .with_context(|| format!("no checker running for {kind}"))?;
        handle.check_now().await
    }

    /// Sweep for silent agents now
    pub async fn sweep_stale_now(&self) -> Result<usize> {
        self.stale.sweep_now().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    /// Stop every actor and write the final snapshot
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        for checker in &self.checkers {
            if let Err(e) = checker.shutdown().await {
                warn!("failed to stop {} checker: {:#}", checker.kind, e);
            }
        }
        if let Err(e) = self.stale.shutdown().await {
            warn!("failed to stop stale detector: {:#}", e);
        }

        self.state
            .shutdown()
            .await
            .context("failed to stop state actor")?;

        info!("monitor stopped");
        Ok(())
    }
}
