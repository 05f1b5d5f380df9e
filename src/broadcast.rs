//! Live event fan-out
//!
//! Events are published on a `tokio::sync::broadcast` channel. Slow receivers
//! lag and lose events, receivers that subscribe late only see new events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{Measurements, MonitorMethod, Status, Target, TargetId};

/// Event pushed to live observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A sample was applied to a target
    MetricUpdate {
        target_id: TargetId,
        hostname: String,
        status: Status,
        timestamp: DateTime<Utc>,
        reachable: bool,
        measurements: Measurements,
    },

    /// A target changed status
    StatusChange {
        target_id: TargetId,
        hostname: String,
        previous: Status,
        status: Status,
        message: String,
    },
}

#[cfg(test)]
impl LiveEvent {
    pub fn target_id(&self) -> TargetId {
        match self {
            LiveEvent::MetricUpdate { target_id, .. } | LiveEvent::StatusChange { target_id, .. } => {
                *target_id
            }
        }
    }
}

/// Human-readable text of a status change
///
/// `measurements` is the sample that caused the change, absent when the
/// change was not caused by a sample (stale agents).
pub fn transition_message(
    target: &Target,
    status: Status,
    measurements: Option<&Measurements>,
) -> String {
    let host = &target.hostname;

    if let MonitorMethod::TcpUdp { port, protocol } = target.method {
        return match status {
            Status::Online => format!("{host} port {port}/{protocol} is now OPEN"),
            Status::Offline => format!("{host} port {port}/{protocol} is now CLOSED"),
            other => format!("{host} port {port}/{protocol} is now {other}"),
        };
    }

    let cause = match measurements {
        None => "no recent report".to_string(),
        Some(Measurements::Agent(metrics)) => format!(
            "CPU {:.1}%, memory {:.1}%",
            metrics.cpu_percent, metrics.mem_percent
        ),
        Some(Measurements::Icmp { .. }) => "ICMP".to_string(),
        Some(Measurements::Http {
            status_code: Some(code),
            ..
        }) => format!("HTTP {code}"),
        Some(Measurements::Http { .. }) => "HTTP error".to_string(),
        Some(Measurements::Dns {
            error_code: Some(code),
            ..
        }) => format!("DNS {code}"),
        Some(Measurements::Dns { .. }) => "DNS".to_string(),
        Some(Measurements::Port { .. }) => "port".to_string(),
    };

    match status {
        Status::Online => format!("{host} is now online ({cause})"),
        Status::Offline => format!("{host} went offline ({cause})"),
        Status::Warning => format!("{host} is in warning ({cause})"),
        Status::Maintenance => format!("{host} is in maintenance"),
    }
}

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<LiveEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber; having none is not an error
    pub fn publish(&self, event: LiveEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!("published live event to {receivers} receivers"),
            Err(_) => trace!("no receivers for live event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }
}
