//! Helper functions for integration tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetmon::Monitor;
use fleetmon::broadcast::LiveEvent;
use fleetmon::checkers::Checker;
use fleetmon::config::{CheckSchedule, Config, SchedulerConfig, StaleConfig, StorageConfig};
use fleetmon::model::{Measurements, MethodKind, MonitorMethod, ProbeResult, Target};
use fleetmon::monitors::agent::AgentReport;
use tokio::sync::broadcast;

/// Checker answering each probe with the next scripted reachability
///
/// Once the script runs out every probe is unreachable.
pub struct ScriptedChecker {
    kind: MethodKind,
    script: Mutex<VecDeque<bool>>,
}

impl ScriptedChecker {
    pub fn new(kind: MethodKind, script: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.iter().copied().collect()),
        })
    }

    fn measurements(&self, target: &Target, reachable: bool) -> Measurements {
        match self.kind {
            MethodKind::Http => Measurements::Http {
                response_time_ms: 12,
                status_code: Some(if reachable { 200 } else { 503 }),
                body_size: 64,
            },
            MethodKind::TcpUdp => Measurements::Port {
                response_time_ms: 3,
                port: match target.method {
                    MonitorMethod::TcpUdp { port, .. } => port,
                    _ => 0,
                },
                protocol: Default::default(),
            },
            _ => Measurements::Icmp {
                latency_ms: reachable.then_some(4.2),
                packet_loss: if reachable { 0.0 } else { 100.0 },
                ttl: reachable.then_some(64),
            },
        }
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    fn kind(&self) -> MethodKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn probe(&self, target: &Target) -> ProbeResult {
        let reachable = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        ProbeResult::new(reachable, self.measurements(target, reachable))
    }

    fn timed_out(&self, target: &Target, _elapsed: Duration) -> ProbeResult {
        ProbeResult::new(false, self.measurements(target, false))
    }
}

fn idle_schedule() -> CheckSchedule {
    CheckSchedule {
        interval: 3600,
        start_delay: 3600,
    }
}

/// Config whose timers never fire during a test; rounds run via `check_now`
pub fn idle_config() -> Config {
    Config {
        scheduler: SchedulerConfig {
            icmp: idle_schedule(),
            http: idle_schedule(),
            tcp_udp: idle_schedule(),
            dns: idle_schedule(),
            max_concurrent_probes: 8,
        },
        stale: StaleConfig {
            interval: 3600,
            threshold: 120,
        },
        storage: StorageConfig::None,
        ..Default::default()
    }
}

pub async fn start_monitor(config: Config, checkers: Vec<Arc<dyn Checker>>) -> Monitor {
    let mut builder = Monitor::builder(config);
    for checker in checkers {
        builder = builder.checker(checker);
    }
    builder.start().await.unwrap()
}

pub fn agent_report(cpu_percent: f64, mem_percent: f64) -> AgentReport {
    AgentReport {
        cpu_percent,
        mem_percent,
        mem_total: 16_000,
        mem_used: 4_000,
        uptime: 3_600,
        ..Default::default()
    }
}

/// Every event already published, in order
pub fn drain(receiver: &mut broadcast::Receiver<LiveEvent>) -> Vec<LiveEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn status_changes(events: &[LiveEvent]) -> Vec<&LiveEvent> {
    events
        .iter()
        .filter(|e| matches!(e, LiveEvent::StatusChange { .. }))
        .collect()
}
