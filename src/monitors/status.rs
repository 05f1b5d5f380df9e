//! Status engine
//!
//! Pure decision logic turning a probe result and the previous status into the
//! next status:
//!
//! ```text
//! previous == Maintenance        → Maintenance (never overwritten)
//! reachability method:
//!   reachable                    → Online
//!   unreachable                  → Offline   (alert when entering Offline)
//! agent method:
//!   cpu > limit || mem > limit   → Warning
//!   otherwise                    → Online
//! ```
//!
//! Offline alerts fire only on the entry edge, so a target that stays down
//! produces one alert per outage. Agent threshold breaches are evaluated per
//! sample by [`threshold_breaches`] and fire on every breaching report.

use crate::config::Thresholds;
use crate::model::{AgentMetrics, AlertKind, Measurements, ProbeResult, Status};

/// Outcome of evaluating one probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: Status,
    pub transitioned: bool,
    /// Alert raised by entering a bad state
    pub alert: Option<AlertKind>,
}

/// Compute the next status of a target
pub fn decide(previous: Status, result: &ProbeResult, thresholds: &Thresholds) -> Decision {
    if previous == Status::Maintenance {
        return Decision {
            status: Status::Maintenance,
            transitioned: false,
            alert: None,
        };
    }

    let status = match &result.measurements {
        Measurements::Agent(metrics) => {
            if exceeds(metrics, thresholds) {
                Status::Warning
            } else {
                Status::Online
            }
        }
        _ if result.reachable => Status::Online,
        _ => Status::Offline,
    };

    let transitioned = status != previous;

    // agent warnings are reported through threshold_breaches
    let alert = if transitioned && status == Status::Offline {
        AlertKind::down_for(result.measurements.kind())
    } else {
        None
    };

    Decision {
        status,
        transitioned,
        alert,
    }
}

fn exceeds(metrics: &AgentMetrics, thresholds: &Thresholds) -> bool {
    metrics.cpu_percent > thresholds.cpu_percent || metrics.mem_percent > thresholds.mem_percent
}

/// Threshold alerts of one agent sample
pub fn threshold_breaches(metrics: &AgentMetrics, thresholds: &Thresholds) -> Vec<AlertKind> {
    let mut breaches = Vec::new();
    if metrics.cpu_percent > thresholds.cpu_percent {
        breaches.push(AlertKind::HighCpu);
    }
    if metrics.mem_percent > thresholds.mem_percent {
        breaches.push(AlertKind::HighMemory);
    }
    breaches
}
