//! TCP connect and UDP datagram checks
//!
//! UDP has no handshake, so a port counts as open unless the send fails or the
//! host answers with an ICMP port-unreachable (surfaced as a receive error on
//! the connected socket). Silence within the wait counts as open.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

use super::{Checker, elapsed_ms};
use crate::config::ProbeConfig;
use crate::model::{Measurements, MethodKind, MonitorMethod, PortProtocol, ProbeResult, Target};

const UDP_PAYLOAD: &[u8] = b"ping";

pub struct PortChecker {
    timeout: Duration,
}

impl PortChecker {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.port_timeout.max(1)),
        }
    }

    /// Shorter waits, used by tests against local sockets
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn check_tcp(&self, address: &str, port: u16) -> bool {
        match timeout(self.timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("connect to {address}:{port} failed: {e}");
                false
            }
            Err(_) => {
                debug!("connect to {address}:{port} timed out");
                false
            }
        }
    }

    async fn check_udp(&self, address: &str, port: u16) -> bool {
        let remote = match lookup_host((address, port)).await.map(|mut a| a.next()) {
            Ok(Some(remote)) => remote,
            Ok(None) | Err(_) => {
                debug!("cannot resolve {address}");
                return false;
            }
        };

        let local: SocketAddr = if remote.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = match UdpSocket::bind(local).await {
            Ok(socket) => socket,
            Err(e) => {
                debug!("failed to bind udp socket: {e}");
                return false;
            }
        };

        if let Err(e) = socket.connect(remote).await {
            debug!("udp connect to {remote} failed: {e}");
            return false;
        }
        if let Err(e) = socket.send(UDP_PAYLOAD).await {
            debug!("udp send to {remote} failed: {e}");
            return false;
        }

        let mut buf = [0u8; 512];
        match timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                trace!("udp reply of {n} bytes from {remote}");
                true
            }
            Ok(Err(e)) => {
                debug!("udp receive from {remote} failed: {e}");
                false
            }
            Err(_) => true,
        }
    }
}

#[async_trait]
impl Checker for PortChecker {
    fn kind(&self) -> MethodKind {
        MethodKind::TcpUdp
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip_all, fields(target = %target.hostname))]
    async fn probe(&self, target: &Target) -> ProbeResult {
        let MonitorMethod::TcpUdp { port, protocol } = target.method else {
            return self.timed_out(target, Duration::ZERO);
        };

        let address = target.address.trim();
        let start = Instant::now();
        let reachable = match protocol {
            PortProtocol::Tcp => self.check_tcp(address, port).await,
            PortProtocol::Udp => self.check_udp(address, port).await,
        };

        ProbeResult::new(
            reachable,
            Measurements::Port {
                response_time_ms: elapsed_ms(start),
                port,
                protocol,
            },
        )
    }

    fn timed_out(&self, target: &Target, elapsed: Duration) -> ProbeResult {
        let (port, protocol) = match target.method {
            MonitorMethod::TcpUdp { port, protocol } => (port, protocol),
            _ => (0, PortProtocol::Tcp),
        };
        ProbeResult::new(
            false,
            Measurements::Port {
                response_time_ms: elapsed.as_millis() as u64,
                port,
                protocol,
            },
        )
    }
}
