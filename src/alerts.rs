//! Alert sink
//!
//! Append-only record of state changes and threshold breaches. Alerts are only
//! ever appended, acknowledged, or dropped together with their target.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::{
    AgentMetrics, Alert, AlertId, AlertKind, Measurements, MonitorMethod, PortProtocol, Severity,
    Target, TargetId,
};

#[derive(Debug, Default)]
pub struct AlertSink {
    alerts: Vec<Alert>,
    next_id: AlertId,
}

impl AlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(alerts: Vec<Alert>, next_id: AlertId) -> Self {
        let highest = alerts.iter().map(|a| a.id).max().unwrap_or(0);
        let mut alerts = alerts;
        alerts.sort_by_key(|a| a.id);
        Self {
            alerts,
            next_id: next_id.max(highest),
        }
    }

    /// Append a new, unacknowledged alert
    pub fn record(
        &mut self,
        target_id: TargetId,
        kind: AlertKind,
        severity: Severity,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Alert {
        self.next_id += 1;
        let alert = Alert {
            id: self.next_id,
            target_id,
            kind,
            severity,
            message,
            acknowledged: false,
            created_at,
        };

        info!("alert #{} for target {}: {}", alert.id, target_id, alert.message);

        self.alerts.push(alert.clone());
        alert
    }

    /// Mark an alert as acknowledged; acknowledging twice is a no-op
    pub fn acknowledge(&mut self, id: AlertId) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Newest first, optionally restricted to one acknowledgement state
    pub fn list(&self, acknowledged: Option<bool>, limit: usize) -> Vec<Alert> {
        self.alerts
            .iter()
            .rev()
            .filter(|a| acknowledged.is_none_or(|ack| a.acknowledged == ack))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn unacknowledged(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }

    pub fn remove_target(&mut self, target_id: TargetId) {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.target_id != target_id);
        debug!(
            "dropped {} alerts of target {target_id}",
            before - self.alerts.len()
        );
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn next_id(&self) -> AlertId {
        self.next_id
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.clone()
    }
}

/// Threshold breaches and outages are both raised as critical
pub fn severity_of(_kind: AlertKind) -> Severity {
    Severity::Critical
}

/// Message of a threshold breach alert
pub fn breach_message(kind: AlertKind, target: &Target, metrics: &AgentMetrics) -> String {
    match kind {
        AlertKind::HighCpu => format!(
            "CPU usage at {:.1}% on {}",
            metrics.cpu_percent, target.hostname
        ),
        AlertKind::HighMemory => format!(
            "Memory usage at {:.1}% on {}",
            metrics.mem_percent, target.hostname
        ),
        other => down_message(other, target, None),
    }
}

/// Message of an alert raised when a target goes offline
///
/// `detail` carries what the checker observed (status code, error code).
pub fn down_message(kind: AlertKind, target: &Target, detail: Option<&str>) -> String {
    let host = &target.hostname;
    let address = &target.address;
    match kind {
        AlertKind::IcmpDown => format!("ICMP ping failed for {host} ({address})"),
        AlertKind::HttpDown => match detail {
            Some(detail) => format!("HTTP check failed for {host}: {detail}"),
            None => format!("HTTP check failed for {host}: connection error"),
        },
        AlertKind::PortDown => match port_of(target) {
            Some((port, protocol)) => {
                format!("Port {port}/{protocol} closed on {host} ({address})")
            }
            None => format!("Port check failed on {host} ({address})"),
        },
        AlertKind::DnsDown => match detail {
            Some(code) => format!("DNS lookup via {host} ({address}) failed: {code}"),
            None => format!("DNS lookup via {host} ({address}) failed"),
        },
        AlertKind::HighCpu | AlertKind::HighMemory => format!("Resource limit exceeded on {host}"),
    }
}

/// What a failed sample tells about the failure, for alert messages
pub fn failure_detail(measurements: &Measurements) -> Option<String> {
    match measurements {
        Measurements::Http {
            status_code: Some(code),
            ..
        } => Some(format!("status {code}")),
        Measurements::Dns {
            error_code: Some(code),
            ..
        } => Some(code.clone()),
        _ => None,
    }
}

fn port_of(target: &Target) -> Option<(u16, PortProtocol)> {
    match target.method {
        MonitorMethod::TcpUdp { port, protocol } => Some((port, protocol)),
        _ => None,
    }
}
