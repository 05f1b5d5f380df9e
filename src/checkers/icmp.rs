//! ICMP checker backed by the system `ping` command

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::Checker;
use crate::config::ProbeConfig;
use crate::model::{Measurements, MethodKind, ProbeResult, Target};

/// Slack on top of the echo waits for process startup and name resolution
const COMMAND_GRACE: Duration = Duration::from_secs(2);

pub struct IcmpChecker {
    count: u32,
    reply_timeout: Duration,
}

impl IcmpChecker {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            count: config.icmp_count.max(1),
            reply_timeout: Duration::from_secs(config.icmp_timeout.max(1)),
        }
    }

    fn command(&self, address: &str) -> Command {
        let mut command = Command::new("ping");
        if cfg!(windows) {
            command.args([
                "-n",
                &self.count.to_string(),
                "-w",
                &self.reply_timeout.as_millis().to_string(),
                address,
            ]);
        } else {
            command.args([
                "-c",
                &self.count.to_string(),
                "-W",
                &self.reply_timeout.as_secs().to_string(),
                address,
            ]);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Checker for IcmpChecker {
    fn kind(&self) -> MethodKind {
        MethodKind::Icmp
    }

    fn timeout(&self) -> Duration {
        self.reply_timeout * self.count + COMMAND_GRACE
    }

    #[instrument(skip_all, fields(target = %target.hostname))]
    async fn probe(&self, target: &Target) -> ProbeResult {
        let address = target.address.trim();

        // would be parsed as a ping option
        if address.starts_with('-') {
            debug!("refusing to ping {address:?}");
            return unreachable();
        }

        let output = match self.command(address).output().await {
            Ok(output) => output,
            Err(e) => {
                debug!("failed to execute ping: {e}");
                return unreachable();
            }
        };

        if !output.status.success() {
            trace!("ping exited with {}", output.status);
            return unreachable();
        }

        let summary = parse_ping_output(&String::from_utf8_lossy(&output.stdout));
        trace!("ping summary: {summary:?}");

        ProbeResult::new(
            summary.is_reachable(),
            Measurements::Icmp {
                latency_ms: summary.latency_ms,
                packet_loss: summary.packet_loss,
                ttl: summary.ttl,
            },
        )
    }

    fn timed_out(&self, _target: &Target, _elapsed: Duration) -> ProbeResult {
        unreachable()
    }
}

fn unreachable() -> ProbeResult {
    ProbeResult::new(
        false,
        Measurements::Icmp {
            latency_ms: None,
            packet_loss: 100.0,
            ttl: None,
        },
    )
}

/// Figures extracted from `ping` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    pub latency_ms: Option<f64>,
    pub packet_loss: f64,
    pub ttl: Option<u32>,
}

impl PingSummary {
    pub fn is_reachable(&self) -> bool {
        self.latency_ms.is_some() && self.packet_loss < 100.0
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid ping output pattern"))
}

/// Parse the output of Linux, macOS or Windows `ping`
///
/// Latency is the summary average when present, otherwise the mean of the
/// individual `time=` values. Loss defaults to 100% when no summary is found.
pub fn parse_ping_output(output: &str) -> PingSummary {
    static WINDOWS_AVG: OnceLock<Regex> = OnceLock::new();
    static AVG: OnceLock<Regex> = OnceLock::new();
    static RTT: OnceLock<Regex> = OnceLock::new();
    static TIME: OnceLock<Regex> = OnceLock::new();
    static TTL: OnceLock<Regex> = OnceLock::new();
    static LOSS: OnceLock<Regex> = OnceLock::new();
    static SENT: OnceLock<Regex> = OnceLock::new();
    static LOST: OnceLock<Regex> = OnceLock::new();

    let capture = |re: &Regex| -> Option<f64> {
        re.captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    let latency_ms = capture(regex(&WINDOWS_AVG, r"(?i)Average\s*=\s*(\d+)ms"))
        .or_else(|| capture(regex(&AVG, r"(?i)avg\s*[=/]\s*([\d.]+)")))
        .or_else(|| capture(regex(&RTT, r"(?:rtt|round-trip).*?=\s*[\d.]+/([\d.]+)")))
        .or_else(|| {
            let times: Vec<f64> = regex(&TIME, r"(?i)time[=<]\s*([\d.]+)\s*ms")
                .captures_iter(output)
                .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
                .collect();
            (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64)
        });

    let ttl = regex(&TTL, r"(?i)ttl[=:]\s*(\d+)")
        .captures(output)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok());

    let sent = capture(regex(&SENT, r"(?i)Sent\s*=\s*(\d+)"));
    let lost = capture(regex(&LOST, r"(?i)Lost\s*=\s*(\d+)"));
    let packet_loss = match (sent, lost) {
        (Some(sent), Some(lost)) if sent > 0.0 => (lost / sent * 100.0).round(),
        _ => capture(regex(&LOSS, r"(?i)([\d.]+)%\s*(?:packet\s+)?loss")).unwrap_or(100.0),
    };

    PingSummary {
        latency_ms,
        packet_loss,
        ttl,
    }
}
