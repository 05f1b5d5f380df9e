//! Agent report payload
//!
//! Agents push one report per interval. Every numeric field is optional on the
//! wire and defaults to zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AgentMetrics, HardwareSpecs, ProcessSnapshot, TargetId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentReport {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub mem_total: u64,
    pub mem_used: u64,
    pub disk_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub net_in: u64,
    pub net_out: u64,
    pub net_in_rate: f64,
    pub net_out_rate: f64,
    pub uptime: u64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,

    pub cpu_cores: Option<u32>,
    pub ram_total_mb: Option<u64>,
    pub disk_total_gb: Option<u64>,

    /// Replaces the previous process list when present
    pub processes: Option<Vec<ReportedProcess>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportedProcess {
    pub pid: u32,
    pub name: String,
    pub cpu: f64,
    pub mem: f64,
    pub rss: u64,
    pub user: String,
    pub command: String,
}

impl AgentReport {
    pub fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            cpu_percent: self.cpu_percent,
            mem_percent: self.mem_percent,
            mem_total: self.mem_total,
            mem_used: self.mem_used,
            disk_percent: self.disk_percent,
            disk_total: self.disk_total,
            disk_used: self.disk_used,
            net_in: self.net_in,
            net_out: self.net_out,
            net_in_rate: self.net_in_rate,
            net_out_rate: self.net_out_rate,
            uptime: self.uptime,
            load_1: self.load_1,
            load_5: self.load_5,
            load_15: self.load_15,
        }
    }

    /// Merge reported hardware into the known specs; zero or absent values are ignored
    pub fn merge_hardware(&self, known: HardwareSpecs) -> HardwareSpecs {
        HardwareSpecs {
            cpu_cores: self.cpu_cores.filter(|v| *v > 0).unwrap_or(known.cpu_cores),
            ram_total_mb: self
                .ram_total_mb
                .filter(|v| *v > 0)
                .unwrap_or(known.ram_total_mb),
            disk_total_gb: self
                .disk_total_gb
                .filter(|v| *v > 0)
                .unwrap_or(known.disk_total_gb),
        }
    }

    /// Process batch stamped with the report time
    pub fn process_batch(
        &self,
        target_id: TargetId,
        timestamp: DateTime<Utc>,
    ) -> Option<Vec<ProcessSnapshot>> {
        let processes = self.processes.as_ref()?;
        Some(
            processes
                .iter()
                .map(|p| ProcessSnapshot {
                    target_id,
                    timestamp,
                    pid: p.pid,
                    name: p.name.clone(),
                    cpu_percent: p.cpu,
                    mem_percent: p.mem,
                    mem_rss: p.rss,
                    user: p.user.clone(),
                    command: p.command.clone(),
                })
                .collect(),
        )
    }
}
