//! Domain types shared by every part of the monitor
//!
//! A [`Target`] owns exactly one [`MonitorMethod`]. Every observation of a target
//! is stored as a [`Sample`] whose [`Measurements`] variant matches that method.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored target
pub type TargetId = u64;

/// Identifier of an alert
pub type AlertId = u64;

/// Derived availability of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Online,
    Warning,
    Offline,
    /// Set by an operator, never replaced by automated checks
    Maintenance,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Online => "online",
            Status::Warning => "warning",
            Status::Offline => "offline",
            Status::Maintenance => "maintenance",
        };
        write!(f, "{s}")
    }
}

/// Monitor method without its parameters (used for filtering and scheduling)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Agent,
    Icmp,
    Http,
    TcpUdp,
    Dns,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodKind::Agent => "agent",
            MethodKind::Icmp => "icmp",
            MethodKind::Http => "http",
            MethodKind::TcpUdp => "tcp_udp",
            MethodKind::Dns => "dns",
        };
        write!(f, "{s}")
    }
}

/// Transport used by a port probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => write!(f, "tcp"),
            PortProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// DNS record type queried by the DNS checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    #[default]
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Ptr,
    Soa,
    Srv,
    Txt,
}

impl RecordType {
    /// Wire value of the record type (RFC 1035 / RFC 3596 / RFC 2782)
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
        }
    }
}

/// How a target is monitored, with the parameters that only make sense for that method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MonitorMethod {
    /// The target pushes reports authenticated by a shared secret
    Agent { secret: String },
    Icmp,
    Http {
        /// Falls back to `http://<address>` when absent
        url: Option<String>,
    },
    TcpUdp { port: u16, protocol: PortProtocol },
    Dns {
        lookup_domain: String,
        record_type: RecordType,
    },
}

impl MonitorMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            MonitorMethod::Agent { .. } => MethodKind::Agent,
            MonitorMethod::Icmp => MethodKind::Icmp,
            MonitorMethod::Http { .. } => MethodKind::Http,
            MonitorMethod::TcpUdp { .. } => MethodKind::TcpUdp,
            MonitorMethod::Dns { .. } => MethodKind::Dns,
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            MonitorMethod::Agent { secret } => Some(secret),
            _ => None,
        }
    }
}

/// Hardware detected from agent reports
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareSpecs {
    pub cpu_cores: u32,
    pub ram_total_mb: u64,
    pub disk_total_gb: u64,
}

/// A monitored host or endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub hostname: String,
    pub address: String,
    pub location: String,
    pub os: String,
    pub group: String,
    #[serde(flatten)]
    pub method: MonitorMethod,
    pub status: Status,
    pub last_seen: Option<DateTime<Utc>>,
    pub hardware: HardwareSpecs,
    pub created_at: DateTime<Utc>,
}

impl Target {
    pub fn kind(&self) -> MethodKind {
        self.method.kind()
    }
}

/// Metrics pushed by an agent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
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
}

/// Method-specific measurements of one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurements {
    Agent(AgentMetrics),
    Icmp {
        /// Average round trip, absent when no reply was parsed
        latency_ms: Option<f64>,
        packet_loss: f64,
        ttl: Option<u32>,
    },
    Http {
        response_time_ms: u64,
        /// Absent when the request never produced a response
        status_code: Option<u16>,
        body_size: u64,
    },
    Port {
        response_time_ms: u64,
        port: u16,
        protocol: PortProtocol,
    },
    Dns {
        response_time_ms: u64,
        /// Resolved values joined by `", "`
        resolved: Option<String>,
        /// Resolver error code (`ENOTFOUND`, `ETIMEOUT`, ...)
        error_code: Option<String>,
    },
}

impl Measurements {
    pub fn kind(&self) -> MethodKind {
        match self {
            Measurements::Agent(_) => MethodKind::Agent,
            Measurements::Icmp { .. } => MethodKind::Icmp,
            Measurements::Http { .. } => MethodKind::Http,
            Measurements::Port { .. } => MethodKind::TcpUdp,
            Measurements::Dns { .. } => MethodKind::Dns,
        }
    }
}

/// Normalized output of a checker or of an agent report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub timestamp: DateTime<Utc>,
    pub measurements: Measurements,
}

impl ProbeResult {
    pub fn new(reachable: bool, measurements: Measurements) -> Self {
        Self {
            reachable,
            timestamp: Utc::now(),
            measurements,
        }
    }
}

/// One stored observation of a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub target_id: TargetId,
    pub timestamp: DateTime<Utc>,
    pub reachable: bool,
    pub measurements: Measurements,
}

impl Sample {
    pub fn from_probe(target_id: TargetId, result: ProbeResult) -> Self {
        Self {
            target_id,
            timestamp: result.timestamp,
            reachable: result.reachable,
            measurements: result.measurements,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighCpu,
    HighMemory,
    IcmpDown,
    HttpDown,
    PortDown,
    DnsDown,
}

impl AlertKind {
    /// Alert raised when a target of the given method goes offline
    pub fn down_for(kind: MethodKind) -> Option<AlertKind> {
        match kind {
            MethodKind::Agent => None,
            MethodKind::Icmp => Some(AlertKind::IcmpDown),
            MethodKind::Http => Some(AlertKind::HttpDown),
            MethodKind::TcpUdp => Some(AlertKind::PortDown),
            MethodKind::Dns => Some(AlertKind::DnsDown),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// A recorded state change or threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub target_id: TargetId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

/// Alert joined with the current identity of its target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub hostname: String,
    pub address: String,
}

/// One process of an agent's latest process list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub target_id: TargetId,
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub mem_rss: u64,
    pub user: String,
    pub command: String,
}
