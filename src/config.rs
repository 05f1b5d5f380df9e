use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::model::MethodKind;
use crate::registry::TargetSpec;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory only (no persistence)
    #[serde(rename = "none")]
    None,

    /// Single JSON document on disk
    Json {
        #[serde(default = "default_json_path")]
        path: PathBuf,
    },

    /// SQLite key-value table holding the state document
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Json {
            path: default_json_path(),
        }
    }
}

fn default_json_path() -> PathBuf {
    PathBuf::from("./data/db.json")
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./fleetmon.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub stale: StaleConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub probes: ProbeConfig,

    /// Storage configuration (defaults to `./data/db.json`)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Seconds between the first unsaved change and the save
    #[serde(default = "default_save_debounce")]
    pub save_debounce: u64,

    /// Capacity of the live event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Targets registered on startup when the store holds none
    pub targets: Option<Vec<TargetSpec>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            stale: StaleConfig::default(),
            thresholds: Thresholds::default(),
            probes: ProbeConfig::default(),
            storage: StorageConfig::default(),
            save_debounce: default_save_debounce(),
            event_capacity: default_event_capacity(),
            targets: None,
        }
    }
}

impl Config {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_secs(self.save_debounce.max(1))
    }
}

fn default_save_debounce() -> u64 {
    5
}

fn default_event_capacity() -> usize {
    256
}

/// Cadence of one checker
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct CheckSchedule {
    /// Seconds between ticks
    pub interval: u64,
    /// Seconds before the first tick
    pub start_delay: u64,
}

impl CheckSchedule {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_delay)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_icmp_schedule")]
    pub icmp: CheckSchedule,
    #[serde(default = "default_http_schedule")]
    pub http: CheckSchedule,
    #[serde(default = "default_tcp_udp_schedule")]
    pub tcp_udp: CheckSchedule,
    #[serde(default = "default_dns_schedule")]
    pub dns: CheckSchedule,
    /// Probes in flight per checker
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl SchedulerConfig {
    pub fn schedule_for(&self, kind: MethodKind) -> Option<CheckSchedule> {
        match kind {
            MethodKind::Agent => None,
            MethodKind::Icmp => Some(self.icmp),
            MethodKind::Http => Some(self.http),
            MethodKind::TcpUdp => Some(self.tcp_udp),
            MethodKind::Dns => Some(self.dns),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            icmp: default_icmp_schedule(),
            http: default_http_schedule(),
            tcp_udp: default_tcp_udp_schedule(),
            dns: default_dns_schedule(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

// staggered start offsets keep the checkers from firing together
fn default_icmp_schedule() -> CheckSchedule {
    CheckSchedule {
        interval: 30,
        start_delay: 5,
    }
}

fn default_http_schedule() -> CheckSchedule {
    CheckSchedule {
        interval: 30,
        start_delay: 6,
    }
}

fn default_tcp_udp_schedule() -> CheckSchedule {
    CheckSchedule {
        interval: 30,
        start_delay: 7,
    }
}

fn default_dns_schedule() -> CheckSchedule {
    CheckSchedule {
        interval: 30,
        start_delay: 10,
    }
}

fn default_max_concurrent_probes() -> usize {
    64
}

/// Stale agent detection
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct StaleConfig {
    /// Seconds between sweeps
    #[serde(default = "default_stale_interval")]
    pub interval: u64,
    /// Seconds without a report before an agent is offline
    #[serde(default = "default_stale_threshold")]
    pub threshold: u64,
}

impl StaleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.threshold as i64)
    }
}

impl Default for StaleConfig {
    fn default() -> Self {
        Self {
            interval: default_stale_interval(),
            threshold: default_stale_threshold(),
        }
    }
}

fn default_stale_interval() -> u64 {
    60
}

fn default_stale_threshold() -> u64 {
    120
}

/// Agent resource limits
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct Thresholds {
    /// CPU percentage above which an agent is in warning
    #[serde(default = "default_cpu_limit")]
    pub cpu_percent: f64,
    /// Memory percentage above which an agent is in warning
    #[serde(default = "default_mem_limit")]
    pub mem_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_limit(),
            mem_percent: default_mem_limit(),
        }
    }
}

fn default_cpu_limit() -> f64 {
    90.0
}

fn default_mem_limit() -> f64 {
    95.0
}

/// Per-protocol probe settings
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct ProbeConfig {
    /// Echo requests sent per ICMP probe
    #[serde(default = "default_icmp_count")]
    pub icmp_count: u32,
    /// Seconds to wait for each echo reply
    #[serde(default = "default_icmp_timeout")]
    pub icmp_timeout: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
    #[serde(default = "default_port_timeout")]
    pub port_timeout: u64,
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            icmp_count: default_icmp_count(),
            icmp_timeout: default_icmp_timeout(),
            http_timeout: default_http_timeout(),
            port_timeout: default_port_timeout(),
            dns_timeout: default_dns_timeout(),
        }
    }
}

fn default_icmp_count() -> u32 {
    3
}

fn default_icmp_timeout() -> u64 {
    3
}

fn default_http_timeout() -> u64 {
    10
}

fn default_port_timeout() -> u64 {
    5
}

fn default_dns_timeout() -> u64 {
    5
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
