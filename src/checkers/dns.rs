//! DNS checker using raw UDP packets
//!
//! The target address is the resolver under test. One query for the configured
//! domain and record type is sent; the check passes when the resolver answers
//! NOERROR with at least one record of the requested type.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, trace};

use super::{Checker, elapsed_ms};
use crate::config::ProbeConfig;
use crate::model::{Measurements, MethodKind, MonitorMethod, ProbeResult, RecordType, Target};

const DNS_PORT: u16 = 53;
const MAX_MESSAGE: usize = 4096;
const MAX_POINTER_JUMPS: usize = 16;

/// Why a lookup did not produce an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    /// NXDOMAIN
    NotFound,
    ServFail,
    Refused,
    FormErr,
    NotImp,
    /// NOERROR without an answer of the requested type
    NoData,
    Timeout,
    ConnRefused,
    /// Reply could not be decoded
    BadResp,
    /// Domain cannot be encoded as a query name
    BadName,
    /// Target address is not usable as a resolver
    BadResolver,
}

impl DnsError {
    pub fn code(self) -> &'static str {
        match self {
            DnsError::NotFound => "ENOTFOUND",
            DnsError::ServFail => "ESERVFAIL",
            DnsError::Refused => "EREFUSED",
            DnsError::FormErr => "EFORMERR",
            DnsError::NotImp => "ENOTIMP",
            DnsError::NoData => "ENODATA",
            DnsError::Timeout => "ETIMEOUT",
            DnsError::ConnRefused => "ECONNREFUSED",
            DnsError::BadResp => "EBADRESP",
            DnsError::BadName => "EBADNAME",
            DnsError::BadResolver => "EBADRESOLVER",
        }
    }

    fn from_rcode(rcode: u8) -> Option<Self> {
        match rcode {
            0 => None,
            1 => Some(DnsError::FormErr),
            2 => Some(DnsError::ServFail),
            3 => Some(DnsError::NotFound),
            4 => Some(DnsError::NotImp),
            5 => Some(DnsError::Refused),
            _ => Some(DnsError::BadResp),
        }
    }
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for DnsError {}

pub struct DnsChecker {
    timeout: Duration,
}

impl DnsChecker {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.dns_timeout.max(1)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Resolve `domain` against `resolver`, returning the formatted answers
    pub async fn lookup(
        &self,
        resolver: &str,
        domain: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsError> {
        let server = resolver_addr(resolver).ok_or(DnsError::BadResolver)?;
        let id: u16 = rand::random();
        let query = encode_query(id, domain, record_type)?;

        let reply = self.exchange(server, id, &query).await?;
        parse_response(&reply, record_type)
    }

    async fn exchange(
        &self,
        server: SocketAddr,
        id: u16,
        query: &[u8],
    ) -> Result<Vec<u8>, DnsError> {
        let local: SocketAddr = if server.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local).await.map_err(io_error)?;
        socket.connect(server).await.map_err(io_error)?;
        socket.send(query).await.map_err(io_error)?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_MESSAGE];
        loop {
            let n = tokio::time::timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| DnsError::Timeout)?
                .map_err(io_error)?;

            // stray datagrams for an older query are skipped
            if n >= 2 && u16::from_be_bytes([buf[0], buf[1]]) == id {
                buf.truncate(n);
                return Ok(buf);
            }
            trace!("ignoring {n} byte datagram with foreign id");
        }
    }
}

fn io_error(e: std::io::Error) -> DnsError {
    debug!("dns socket error: {e}");
    DnsError::ConnRefused
}

#[async_trait]
impl Checker for DnsChecker {
    fn kind(&self) -> MethodKind {
        MethodKind::Dns
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip_all, fields(target = %target.hostname))]
    async fn probe(&self, target: &Target) -> ProbeResult {
        let MonitorMethod::Dns {
            lookup_domain,
            record_type,
        } = &target.method
        else {
            return failure(Duration::ZERO, DnsError::BadResolver);
        };

        let start = Instant::now();
        match self.lookup(&target.address, lookup_domain, *record_type).await {
            Ok(answers) => ProbeResult::new(
                true,
                Measurements::Dns {
                    response_time_ms: elapsed_ms(start),
                    resolved: Some(answers.join(", ")),
                    error_code: None,
                },
            ),
            Err(e) => {
                debug!("lookup of {lookup_domain} failed: {e}");
                failure(start.elapsed(), e)
            }
        }
    }

    fn timed_out(&self, _target: &Target, elapsed: Duration) -> ProbeResult {
        failure(elapsed, DnsError::Timeout)
    }
}

fn failure(elapsed: Duration, error: DnsError) -> ProbeResult {
    ProbeResult::new(
        false,
        Measurements::Dns {
            response_time_ms: elapsed.as_millis() as u64,
            resolved: None,
            error_code: Some(error.code().to_string()),
        },
    )
}

/// Resolver socket address from an IP literal, optionally with a port
pub fn resolver_addr(address: &str) -> Option<SocketAddr> {
    let address = address.trim();
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some(addr);
    }
    let ip = address
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok()?;
    Some(SocketAddr::new(ip, DNS_PORT))
}

/// Build a recursive query for one question
pub fn encode_query(id: u16, domain: &str, record_type: RecordType) -> Result<Vec<u8>, DnsError> {
    let name = domain.trim().trim_end_matches('.');
    if name.is_empty() || name.len() > 253 {
        return Err(DnsError::BadName);
    }

    let mut packet = Vec::with_capacity(18 + name.len());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // recursion desired
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]); // ANCOUNT, NSCOUNT, ARCOUNT

    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 || !label.is_ascii() {
            return Err(DnsError::BadName);
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    packet.extend_from_slice(&record_type.code().to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // IN
    Ok(packet)
}

/// Extract the answers of the requested type from a reply
pub fn parse_response(message: &[u8], record_type: RecordType) -> Result<Vec<String>, DnsError> {
    if message.len() < 12 || message[2] & 0x80 == 0 {
        return Err(DnsError::BadResp);
    }
    if let Some(error) = DnsError::from_rcode(message[3] & 0x0F) {
        return Err(error);
    }

    let questions = read_u16(message, 4)?;
    let answers = read_u16(message, 6)?;

    let mut offset = 12;
    for _ in 0..questions {
        offset = skip_name(message, offset)? + 4;
    }

    let mut values = Vec::new();
    for _ in 0..answers {
        offset = skip_name(message, offset)?;
        let rtype = read_u16(message, offset)?;
        let rdlength = read_u16(message, offset + 8)? as usize;
        let rdata = offset + 10;
        let end = rdata + rdlength;
        if end > message.len() {
            return Err(DnsError::BadResp);
        }

        if rtype == record_type.code() {
            values.push(format_rdata(message, rdata, end, record_type)?);
        }
        offset = end;
    }

    if values.is_empty() {
        return Err(DnsError::NoData);
    }
    Ok(values)
}

fn format_rdata(
    message: &[u8],
    start: usize,
    end: usize,
    record_type: RecordType,
) -> Result<String, DnsError> {
    let rdata = &message[start..end];
    let value = match record_type {
        RecordType::A => {
            let octets: [u8; 4] = rdata.try_into().map_err(|_| DnsError::BadResp)?;
            Ipv4Addr::from(octets).to_string()
        }
        RecordType::Aaaa => {
            let octets: [u8; 16] = rdata.try_into().map_err(|_| DnsError::BadResp)?;
            Ipv6Addr::from(octets).to_string()
        }
        RecordType::Cname | RecordType::Ns | RecordType::Ptr => read_name(message, start)?.0,
        RecordType::Mx => {
            let preference = read_u16(message, start)?;
            let (exchange, _) = read_name(message, start + 2)?;
            format!("{preference} {exchange}")
        }
        RecordType::Srv => {
            let priority = read_u16(message, start)?;
            let weight = read_u16(message, start + 2)?;
            let port = read_u16(message, start + 4)?;
            let (host, _) = read_name(message, start + 6)?;
            format!("{priority} {weight} {port} {host}")
        }
        RecordType::Txt => {
            let mut text = String::new();
            let mut pos = 0;
            while pos < rdata.len() {
                let len = rdata[pos] as usize;
                let chunk = rdata.get(pos + 1..pos + 1 + len).ok_or(DnsError::BadResp)?;
                text.push_str(&String::from_utf8_lossy(chunk));
                pos += 1 + len;
            }
            text
        }
        RecordType::Soa => {
            let (mname, next) = read_name(message, start)?;
            let (rname, next) = read_name(message, next)?;
            let serial = read_u32(message, next)?;
            let refresh = read_u32(message, next + 4)?;
            let retry = read_u32(message, next + 8)?;
            let expire = read_u32(message, next + 12)?;
            let minimum = read_u32(message, next + 16)?;
            format!("{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}")
        }
    };
    Ok(value)
}

fn read_u16(message: &[u8], offset: usize) -> Result<u16, DnsError> {
    message
        .get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DnsError::BadResp)
}

fn read_u32(message: &[u8], offset: usize) -> Result<u32, DnsError> {
    message
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DnsError::BadResp)
}

/// Offset just past the (possibly compressed) name at `offset`
fn skip_name(message: &[u8], offset: usize) -> Result<usize, DnsError> {
    read_name(message, offset).map(|(_, next)| next)
}

/// Decode a name, following compression pointers
///
/// Returns the dotted name and the offset after the name at its original
/// position.
fn read_name(message: &[u8], offset: usize) -> Result<(String, usize), DnsError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = offset;
    let mut next = None;
    let mut jumps = 0;

    loop {
        let len = *message.get(pos).ok_or(DnsError::BadResp)? as usize;
        match len {
            0 => {
                let next = next.unwrap_or(pos + 1);
                return Ok((labels.join("."), next));
            }
            len if len & 0xC0 == 0xC0 => {
                let low = *message.get(pos + 1).ok_or(DnsError::BadResp)? as usize;
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(DnsError::BadResp);
                }
                next.get_or_insert(pos + 2);
                pos = ((len & 0x3F) << 8) | low;
            }
            len if len <= 63 => {
                let label = message.get(pos + 1..pos + 1 + len).ok_or(DnsError::BadResp)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos += 1 + len;
            }
            _ => return Err(DnsError::BadResp),
        }
    }
}
