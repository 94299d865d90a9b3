//! HTTP probe that revalidates one cached URL.
//!
//! ### Request shape
//! - `GET` carrying exactly one cookie, the marker `staticfilecache=1`. No
//!   cookie store: cookies set by one probed page never reach another probe.
//! - Descriptive User-Agent (default: `Staticfilecache Crawler`)
//! - Connect and total timeouts (default: 2s each), clamped to the run deadline
//! - Redirects followed up to the configured limit
//!
//! ### Classification
//! - A received response yields its status code, whatever it is.
//! - Any transport failure (bad URL, DNS, connect, timeout, TLS, malformed
//!   response) yields [`PROBE_FAILED_STATUS`].
//! - One attempt per call, no retry.

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

use crate::runner::RunContext;
use sfc_core::{Error, UrlError, WorkerConfig, parse_target};

/// Cookie that tells the site the request comes from the cache warmer, so it
/// skips serving the static copy being validated.
pub const MARKER_COOKIE: &str = "staticfilecache=1";

/// Synthetic status recorded when no HTTP response was received.
pub const PROBE_FAILED_STATUS: u16 = 900;

/// The only status that counts as a valid cached page.
pub const FRESH_STATUS: u16 = 200;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// HTTP status, or [`PROBE_FAILED_STATUS`].
    pub status_code: u16,
    /// Transport error description when the probe failed.
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn from_status(status_code: u16) -> Self {
        Self { status_code, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status_code: PROBE_FAILED_STATUS, error: Some(error.into()) }
    }

    /// True only for exactly `200`; redirects and other 2xx codes are stale.
    pub fn is_fresh(&self) -> bool {
        self.status_code == FRESH_STATUS
    }

    /// Value persisted in the queue's `result_code` column.
    pub fn result_code(&self) -> String {
        self.status_code.to_string()
    }
}

/// Transport used by the queue runner.
///
/// Implementations never fail: transport errors are folded into the
/// returned [`ProbeResult`].
#[async_trait]
pub trait Probe: Send + Sync {
    async fn fetch(&self, ctx: &RunContext, url: &str) -> ProbeResult;
}

/// Errors that end a probe without a response.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] UrlError),

    #[error("run deadline exceeded before the request was sent")]
    DeadlineExceeded,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ProbeError::Timeout(err.to_string()) } else { ProbeError::Transport(err.to_string()) }
    }
}

/// Configuration for the HTTP probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// User agent string (default: "Staticfilecache Crawler")
    pub user_agent: String,

    /// Total request timeout (default: 2s)
    pub timeout: Duration,

    /// Connect timeout (default: 2s)
    pub connect_timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for ProbeConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// reqwest-backed [`Probe`].
pub struct HttpProbe {
    http: Client,
    config: ProbeConfig,
}

impl HttpProbe {
    /// Build the probe and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `Error::HttpClient` when the client cannot be constructed
    /// (e.g. the TLS backend fails to initialize), before any probing.
    pub fn new(config: ProbeConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpClient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    async fn send(&self, ctx: &RunContext, url: &str) -> Result<StatusCode, ProbeError> {
        let target = parse_target(url)?;
        let timeout = ctx
            .clamp_timeout(self.config.timeout)
            .ok_or(ProbeError::DeadlineExceeded)?;

        let mut response = self
            .http
            .get(target)
            .header(COOKIE, HeaderValue::from_static(MARKER_COOKIE))
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();

        // Let the page render completely before counting it as warmed.
        while response.chunk().await?.is_some() {}

        Ok(status)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn fetch(&self, ctx: &RunContext, url: &str) -> ProbeResult {
        let start = Instant::now();
        match self.send(ctx, url).await {
            Ok(status) => {
                tracing::debug!(
                    url,
                    status = status.as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "probe completed"
                );
                ProbeResult::from_status(status.as_u16())
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "probe failed");
                ProbeResult::failed(e.to_string())
            }
        }
    }
}
