//! Target registry
//!
//! Authoritative record of monitored targets and their current status.
//! Registration validates identity fields and assigns ids and agent secrets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::model::{
    HardwareSpecs, MethodKind, MonitorMethod, PortProtocol, RecordType, Sample, Status, Target,
    TargetId,
};
use crate::store::FleetUsage;
use crate::util::generate_secret;

const DEFAULT_LOCATION: &str = "Jakarta";
const DEFAULT_OS: &str = "-";
const DEFAULT_GROUP: &str = "General";
const DEFAULT_PORT: u16 = 80;
const DEFAULT_LOOKUP_DOMAIN: &str = "google.com";

/// Default page size of [`TargetRegistry::list`]
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Registration request
///
/// Method parameters are flat; only those matching `method` are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    pub hostname: String,
    pub address: String,
    #[serde(default)]
    pub method: Option<MethodKind>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<PortProtocol>,
    #[serde(default)]
    pub lookup_domain: Option<String>,
    #[serde(default)]
    pub record_type: Option<RecordType>,
}

impl TargetSpec {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>, method: MethodKind) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            method: Some(method),
            ..Default::default()
        }
    }

    fn build_method(&self) -> MonitorMethod {
        match self.method.unwrap_or(MethodKind::Agent) {
            MethodKind::Agent => MonitorMethod::Agent {
                secret: generate_secret(),
            },
            MethodKind::Icmp => MonitorMethod::Icmp,
            MethodKind::Http => MonitorMethod::Http {
                url: self.url.clone().filter(|url| !url.trim().is_empty()),
            },
            MethodKind::TcpUdp => MonitorMethod::TcpUdp {
                port: self.port.filter(|p| *p != 0).unwrap_or(DEFAULT_PORT),
                protocol: self.protocol.unwrap_or_default(),
            },
            MethodKind::Dns => MonitorMethod::Dns {
                lookup_domain: self
                    .lookup_domain
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_LOOKUP_DOMAIN.to_string()),
                record_type: self.record_type.unwrap_or_default(),
            },
        }
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub location: Option<String>,
    pub os: Option<String>,
    pub group: Option<String>,
    pub status: Option<Status>,
    pub url: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<PortProtocol>,
    pub lookup_domain: Option<String>,
    pub record_type: Option<RecordType>,
}

/// Filter and page selection for [`TargetRegistry::list`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFilter {
    pub status: Option<Status>,
    pub group: Option<String>,
    pub method: Option<MethodKind>,
    pub search: Option<String>,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self {
            status: None,
            group: None,
            method: None,
            search: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl TargetFilter {
    fn matches(&self, target: &Target) -> bool {
        if self.status.is_some_and(|status| target.status != status) {
            return false;
        }
        if self.group.as_ref().is_some_and(|group| &target.group != group) {
            return false;
        }
        if self.method.is_some_and(|kind| target.kind() != kind) {
            return false;
        }
        if let Some(search) = &self.search {
            let query = search.to_lowercase();
            return target.hostname.to_lowercase().contains(&query)
                || target.address.contains(search.as_str());
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Number of targets per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub online: usize,
    pub warning: usize,
    pub offline: usize,
    pub maintenance: usize,
}

/// Target listed together with its newest sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetView {
    #[serde(flatten)]
    pub target: Target,
    pub latest: Option<Sample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub group: String,
    pub count: usize,
}

/// Fleet overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStats {
    #[serde(flatten)]
    pub counts: StatusCounts,
    #[serde(flatten)]
    pub usage: FleetUsage,
    /// Unacknowledged alerts
    pub active_alerts: usize,
    pub groups: Vec<GroupCount>,
}

#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, Target>,
    next_id: TargetId,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted targets
    pub fn restore(targets: Vec<Target>, next_id: TargetId) -> Self {
        let highest = targets.iter().map(|t| t.id).max().unwrap_or(0);
        Self {
            targets: targets.into_iter().map(|t| (t.id, t)).collect(),
            next_id: next_id.max(highest),
        }
    }

    pub fn create(&mut self, spec: TargetSpec) -> MonitorResult<Target> {
        let hostname = spec.hostname.trim();
        let address = spec.address.trim();
        if hostname.is_empty() || address.is_empty() {
            return Err(MonitorError::Validation(
                "hostname and address are required".to_string(),
            ));
        }

        self.next_id += 1;
        let target = Target {
            id: self.next_id,
            hostname: hostname.to_string(),
            address: address.to_string(),
            location: spec.location.clone().unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            os: spec.os.clone().unwrap_or_else(|| DEFAULT_OS.to_string()),
            group: spec.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            method: spec.build_method(),
            status: spec.status.unwrap_or(Status::Offline),
            last_seen: None,
            hardware: HardwareSpecs::default(),
            created_at: Utc::now(),
        };

        debug!(
            "registered target {} ({}) via {}",
            target.id,
            target.hostname,
            target.kind()
        );

        self.targets.insert(target.id, target.clone());
        Ok(target)
    }

    pub fn update(&mut self, id: TargetId, update: TargetUpdate) -> bool {
        let Some(target) = self.targets.get_mut(&id) else {
            return false;
        };

        let TargetUpdate {
            hostname,
            address,
            location,
            os,
            group,
            status,
            url,
            port,
            protocol,
            lookup_domain,
            record_type,
        } = update;

        if let Some(hostname) = hostname.filter(|h| !h.trim().is_empty()) {
            target.hostname = hostname.trim().to_string();
        }
        if let Some(address) = address.filter(|a| !a.trim().is_empty()) {
            target.address = address.trim().to_string();
        }
        if let Some(location) = location {
            target.location = location;
        }
        if let Some(os) = os {
            target.os = os;
        }
        if let Some(group) = group {
            target.group = group;
        }
        if let Some(status) = status {
            target.status = status;
        }

        // parameters of other methods are ignored
        match &mut target.method {
            MonitorMethod::Http { url: current } => {
                if let Some(url) = url {
                    *current = Some(url).filter(|u| !u.trim().is_empty());
                }
            }
            MonitorMethod::TcpUdp {
                port: current_port,
                protocol: current_protocol,
            } => {
                if let Some(port) = port.filter(|p| *p != 0) {
                    *current_port = port;
                }
                if let Some(protocol) = protocol {
                    *current_protocol = protocol;
                }
            }
            MonitorMethod::Dns {
                lookup_domain: current_domain,
                record_type: current_type,
            } => {
                if let Some(domain) = lookup_domain.filter(|d| !d.trim().is_empty()) {
                    *current_domain = domain;
                }
                if let Some(record_type) = record_type {
                    *current_type = record_type;
                }
            }
            MonitorMethod::Agent { .. } | MonitorMethod::Icmp => {}
        }

        true
    }

    pub fn delete(&mut self, id: TargetId) -> Option<Target> {
        self.targets.remove(&id)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    /// Record an automated status decision
    pub fn set_status(&mut self, id: TargetId, status: Status, seen_at: Option<DateTime<Utc>>) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.status = status;
            if let Some(seen_at) = seen_at {
                target.last_seen = Some(seen_at);
            }
        }
    }

    pub fn set_hardware(&mut self, id: TargetId, hardware: HardwareSpecs) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.hardware = hardware;
        }
    }

    pub fn find_by_secret(&self, secret: &str) -> Option<&Target> {
        self.targets
            .values()
            .find(|t| t.method.secret().is_some_and(|s| s == secret))
    }

    /// All targets monitored with the given method
    pub fn of_kind(&self, kind: MethodKind) -> Vec<Target> {
        self.targets
            .values()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Filtered, sorted and paged listing
    ///
    /// Online targets come first, then targets are ordered by hostname.
    pub fn list(&self, filter: &TargetFilter) -> Page<Target> {
        let mut matching: Vec<&Target> = self
            .targets
            .values()
            .filter(|t| filter.matches(t))
            .collect();

        matching.sort_by(|a, b| {
            let a_offline = a.status != Status::Online;
            let b_offline = b.status != Status::Online;
            a_offline
                .cmp(&b_offline)
                .then_with(|| a.hostname.cmp(&b.hostname))
        });

        let total = matching.len();
        let page = filter.page.max(1);
        let limit = filter.limit.max(1);
        let offset = (page - 1).saturating_mul(limit);

        Page {
            data: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            pagination: Pagination {
                total,
                page,
                limit,
                pages: total.div_ceil(limit),
            },
        }
    }

    /// Sorted distinct group labels
    pub fn groups(&self) -> Vec<String> {
        self.targets
            .values()
            .map(|t| t.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Target count per group, largest first
    pub fn group_counts(&self) -> Vec<GroupCount> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for target in self.targets.values() {
            *counts.entry(target.group.as_str()).or_default() += 1;
        }

        let mut counts: Vec<_> = counts
            .into_iter()
            .map(|(group, count)| GroupCount {
                group: group.to_string(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.targets.len(),
            ..Default::default()
        };
        for target in self.targets.values() {
            match target.status {
                Status::Online => counts.online += 1,
                Status::Warning => counts.warning += 1,
                Status::Offline => counts.offline += 1,
                Status::Maintenance => counts.maintenance += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn next_id(&self) -> TargetId {
        self.next_id
    }

    pub fn snapshot(&self) -> Vec<Target> {
        self.targets.values().cloned().collect()
    }
}
