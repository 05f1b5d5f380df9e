//! Protocol checkers
//!
//! A checker probes one target and normalizes whatever happens into a
//! [`ProbeResult`]. Failures never surface as errors: an unreachable host, a
//! refused connection or a malformed reply are all `reachable: false` results
//! carrying the measurements that could be taken.
//!
//! | Method  | Probe                          | Reachable when                      |
//! |---------|--------------------------------|-------------------------------------|
//! | icmp    | system `ping`                  | a reply arrived and latency parsed  |
//! | http    | GET on the URL                 | status in `200..500`                |
//! | tcp_udp | connect / datagram             | connected / no error within wait    |
//! | dns     | raw UDP query to the target    | NOERROR with an answer of the type  |

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::model::{MethodKind, ProbeResult, Target};

pub mod dns;
pub mod http;
pub mod icmp;
pub mod port;

pub use dns::DnsChecker;
pub use http::HttpChecker;
pub use icmp::IcmpChecker;
pub use port::PortChecker;

/// Capability shared by all protocol checkers
#[async_trait]
pub trait Checker: Send + Sync + 'static {
    /// Method of the targets this checker probes
    fn kind(&self) -> MethodKind;

    /// Longest time a single probe is expected to take
    fn timeout(&self) -> Duration;

    /// Probe one target; never fails
    async fn probe(&self, target: &Target) -> ProbeResult;

    /// Result recorded when a probe exceeded the scheduler's hard deadline
    fn timed_out(&self, target: &Target, elapsed: Duration) -> ProbeResult;
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
