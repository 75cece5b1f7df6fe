//! HTTP fetcher.
//!
//! One GET per call. `Accept-Encoding: gzip` is always sent and gzip bodies
//! are inflated here, so callers always see the plain body. Non-200 statuses
//! are returned with their body, not raised.

use std::time::{Duration, Instant};

use ahx_core::codec;
use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use tracing::debug;

use crate::error::FetchError;

/// TCP dial bound.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);
/// TLS handshake bound, on top of the dial.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub body: Vec<u8>,
    /// Bytes on the wire, before inflation.
    pub content_length: usize,
    /// Time to first byte: dial, TLS handshake and the wait for response
    /// headers. A pooled connection skips the first two.
    pub conn_duration: Duration,
    /// Total round trip including the body.
    pub req_duration: Duration,
    pub status: u16,
}

impl DownloadResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<DownloadResponse, FetchError>;
}

/// `reqwest` downloader with one pooled client.
#[derive(Clone)]
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeouts(DIAL_TIMEOUT, TLS_HANDSHAKE_TIMEOUT)
    }

    /// reqwest runs the dial and the TLS handshake as one connect phase, so
    /// that phase is bounded by `dial + handshake`.
    pub fn with_timeouts(dial: Duration, handshake: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(dial + handshake)
            .build()
            .map_err(|e| FetchError::Transport { url: String::new(), reason: e.to_string() })?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, url: &str) -> Result<DownloadResponse, FetchError> {
        let started = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(|e| FetchError::Transport { url: redact(url), reason: e.to_string() })?;
        let conn_duration = started.elapsed();

        let status = resp.status().as_u16();
        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        let raw = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transport { url: redact(url), reason: e.to_string() })?;
        let content_length = raw.len();

        let body = if gzipped {
            codec::gunzip(&raw).map_err(|e| FetchError::Decode { url: redact(url), reason: e.to_string() })?
        } else {
            raw.to_vec()
        };
        let req_duration = started.elapsed();

        debug!(
            status,
            content_length,
            conn_ms = conn_duration.as_millis() as u64,
            req_ms = req_duration.as_millis() as u64,
            "[fetch] GET {}",
            redact(url)
        );

        Ok(DownloadResponse { body, content_length, conn_duration, req_duration, status })
    }
}

/// Strip the query string so access tokens never reach logs or errors.
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}
