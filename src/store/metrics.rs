//! Bounded per-target sample history
//!
//! Each target keeps at most [`SAMPLE_RETENTION`] samples in timestamp order.
//! When a target exceeds the cap, the oldest samples are evicted first.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::{Measurements, Sample, TargetId};

/// Maximum samples kept per target
pub const SAMPLE_RETENTION: usize = 120;

/// Agent load across the fleet, taken from each agent's newest sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FleetUsage {
    /// Mean CPU percent, rounded to one decimal
    pub avg_cpu: f64,
    pub total_bandwidth_in: f64,
    pub total_bandwidth_out: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default)]
pub struct MetricStore {
    /// Samples grouped by target, oldest first
    samples: HashMap<TargetId, VecDeque<Sample>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, evicting the oldest surplus for its target
    ///
    /// Samples normally arrive in timestamp order. A late sample is inserted
    /// at its timestamp position so the history stays sorted. Returns false
    /// when the sample is older than a full history and was not kept.
    pub fn append(&mut self, sample: Sample) -> bool {
        let series = self.samples.entry(sample.target_id).or_default();

        let position = series.partition_point(|s| s.timestamp <= sample.timestamp);
        if position == 0 && series.len() >= SAMPLE_RETENTION {
            trace!(
                "sample of target {} from {} predates its history",
                sample.target_id, sample.timestamp
            );
            return false;
        }
        series.insert(position, sample);

        while series.len() > SAMPLE_RETENTION {
            if let Some(evicted) = series.pop_front() {
                trace!(
                    "evicted sample of target {} from {}",
                    evicted.target_id, evicted.timestamp
                );
            }
        }

        true
    }

    /// Most recent sample of a target
    pub fn latest(&self, target_id: TargetId) -> Option<&Sample> {
        self.samples.get(&target_id).and_then(|series| series.back())
    }

    /// Up to `max_count` most recent samples, oldest first
    pub fn history(&self, target_id: TargetId, max_count: usize) -> Vec<Sample> {
        let Some(series) = self.samples.get(&target_id) else {
            return Vec::new();
        };

        let skip = series.len().saturating_sub(max_count);
        series.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self, target_id: TargetId) -> usize {
        self.samples.get(&target_id).map_or(0, VecDeque::len)
    }

    /// Usage over the newest sample of every agent
    ///
    /// Targets whose newest sample comes from another method do not count.
    pub fn fleet_usage(&self) -> FleetUsage {
        let mut cpu_sum = 0.0;
        let mut agents = 0;
        let mut usage = FleetUsage::default();

        for sample in self.samples.values().filter_map(VecDeque::back) {
            if let Measurements::Agent(metrics) = &sample.measurements {
                cpu_sum += metrics.cpu_percent;
                usage.total_bandwidth_in += metrics.net_in_rate;
                usage.total_bandwidth_out += metrics.net_out_rate;
                agents += 1;
            }
        }

        if agents > 0 {
            usage.avg_cpu = round1(cpu_sum / agents as f64);
        }
        usage.total_bandwidth_in = round1(usage.total_bandwidth_in);
        usage.total_bandwidth_out = round1(usage.total_bandwidth_out);
        usage
    }

    /// Drop all samples of a target, returning how many were removed
    pub fn remove_target(&mut self, target_id: TargetId) -> usize {
        self.samples
            .remove(&target_id)
            .map_or(0, |series| series.len())
    }

    /// Flatten every series for persistence
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.values().flatten().cloned().collect()
    }

    /// Rebuild the store from persisted samples, applying retention
    pub fn restore(samples: Vec<Sample>) -> Self {
        let mut store = Self::new();
        for sample in samples {
            store.append(sample);
        }
        store
    }
}
