//! HTTP checker
//!
//! A target is reachable when the server answers with a status below 500;
//! client errors still prove the service is up. Redirects are not followed,
//! the target's own answer is what counts. Certificates are not verified,
//! so self-signed endpoints can be monitored.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use super::{Checker, elapsed_ms};
use crate::config::ProbeConfig;
use crate::model::{Measurements, MethodKind, MonitorMethod, ProbeResult, Target};

pub struct HttpChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(config: &ProbeConfig) -> reqwest::Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, timeout })
    }

    /// Configured URL, or plain HTTP on the target address
    pub fn url_for(target: &Target) -> String {
        match &target.method {
            MonitorMethod::Http { url: Some(url) } => url.clone(),
            _ => format!("http://{}", target.address),
        }
    }
}

pub fn is_reachable_status(status: u16) -> bool {
    (200..500).contains(&status)
}

#[async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> MethodKind {
        MethodKind::Http
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip_all, fields(target = %target.hostname))]
    async fn probe(&self, target: &Target) -> ProbeResult {
        let url = Self::url_for(target);
        trace!("requesting {url}");

        let start = Instant::now();
        let mut response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("request to {url} failed: {e}");
                return self.timed_out(target, start.elapsed());
            }
        };

        let status = response.status().as_u16();

        // only the size is kept, chunks are dropped as they arrive
        let mut body_size = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body_size += chunk.len() as u64,
                Ok(None) => break,
                Err(e) => {
                    debug!("failed to read body of {url}: {e}");
                    break;
                }
            }
        }

        ProbeResult::new(
            is_reachable_status(status),
            Measurements::Http {
                response_time_ms: elapsed_ms(start),
                status_code: Some(status),
                body_size,
            },
        )
    }

    fn timed_out(&self, _target: &Target, elapsed: Duration) -> ProbeResult {
        ProbeResult::new(
            false,
            Measurements::Http {
                response_time_ms: elapsed.as_millis() as u64,
                status_code: None,
                body_size: 0,
            },
        )
    }
}
