//! HTTP client for a zonal statistics service.
//!
//! The request is POSTed as JSON to `{endpoint}/zonal-histogram`. A `2xx`
//! response carries the raw per-patch CSV as its body, which is written to the
//! output path. An empty body means the job produced nothing; no file is
//! written so the retry driver sees a missing artifact.

use crate::request::{JobOutput, StatsClient, StatsRequest};
use crate::{RemoteError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout. Zonal jobs over large areas are slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Path appended to the endpoint for histogram jobs.
const JOB_PATH: &str = "zonal-histogram";

/// Longest error body kept in [`RemoteError::JobRejected`].
const MAX_ERROR_BODY: usize = 512;

/// Request statistics for the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestStats {
    /// Jobs submitted this session.
    pub jobs_sent: usize,
    /// Jobs that returned a non-empty artifact.
    pub artifacts_received: usize,
    /// Total artifact bytes received this session.
    pub bytes_received: u64,
}

/// Blocking HTTP statistics client.
pub struct HttpStatsClient {
    endpoint: String,
    client: reqwest::blocking::Client,
    jobs_sent: AtomicUsize,
    artifacts_received: AtomicUsize,
    bytes_received: AtomicU64,
}

impl std::fmt::Debug for HttpStatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStatsClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpStatsClient {
    /// Create a client with the default timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a client with a specific per-request timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Self::with_client(endpoint, client)
    }

    /// Create a client around a preconfigured `reqwest` client.
    pub fn with_client(endpoint: impl Into<String>, client: reqwest::blocking::Client) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(RemoteError::InvalidEndpoint(endpoint));
        }
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            jobs_sent: AtomicUsize::new(0),
            artifacts_received: AtomicUsize::new(0),
            bytes_received: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL jobs are posted to.
    pub fn job_url(&self) -> String {
        format!("{}/{}", self.endpoint, JOB_PATH)
    }

    /// Request statistics for this session.
    pub fn request_stats(&self) -> RequestStats {
        RequestStats {
            jobs_sent: self.jobs_sent.load(Ordering::Relaxed),
            artifacts_received: self.artifacts_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

impl StatsClient for HttpStatsClient {
    fn request(&self, request: &StatsRequest, output: &Path) -> Result<JobOutput> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let url = self.job_url();
        debug!("POST {} (tile_scale={})", url, request.resource_multiplier);
        self.jobs_sent.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/csv")
            .body(serde_json::to_vec(request)?)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RemoteError::JobRejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Ok(JobOutput {
                messages: vec![format!("{} returned an empty result", url)],
            });
        }

        self.artifacts_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        fs::write(output, &bytes)?;

        Ok(JobOutput {
            messages: vec![format!("Received {} bytes from {}", bytes.len(), url)],
        })
    }
}
