// crates/admission-gate-providers/src/http.rs
// ============================================================================
// Module: HTTP Range Source
// Description: RangeSource backed by a publisher's HTTPS endpoint.
// Purpose: Fetch published ranges with strict limits.
// Dependencies: admission-gate-core, reqwest
// ============================================================================

//! ## Overview
//! [`HttpRangeSource`] issues one bounded GET per refresh. Redirects are not
//! followed, cleartext `http://` is refused unless explicitly allowed, and
//! bodies larger than the configured limit fail the fetch.
//! Security posture: publisher responses are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use admission_gate_core::RangeCategory;
use admission_gate_core::RangeSource;
use admission_gate_core::RangeSourceError;
use ipnet::IpNet;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use tracing::debug;

use crate::document::ResponseShape;
use crate::document::parse_range_document;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for an HTTP range source.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` URLs.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - `timeout_ms` applies to the full request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRangeSourceConfig {
    /// Source name used in status reports.
    pub name: String,
    /// Publisher URL.
    pub url: String,
    /// Category of the published ranges.
    pub category: RangeCategory,
    /// Expected document layout.
    pub shape: ResponseShape,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
}

impl HttpRangeSourceConfig {
    /// Creates a config with default limits.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: RangeCategory) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category,
            shape: ResponseShape::Auto,
            timeout_ms: 10_000,
            max_response_bytes: 1024 * 1024,
            user_agent: concat!("admission-gate/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_http: false,
        }
    }
}

// ============================================================================
// SECTION: Source
// ============================================================================

/// Range source that fetches a publisher document over HTTP.
pub struct HttpRangeSource {
    /// Source configuration.
    config: HttpRangeSourceConfig,
    /// Parsed publisher URL.
    url: Url,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl std::fmt::Debug for HttpRangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRangeSource")
            .field("name", &self.config.name)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpRangeSource {
    /// Creates a source from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeSourceError::Transport`] when the URL is unusable or the
    /// client cannot be built.
    pub fn new(config: HttpRangeSourceConfig) -> Result<Self, RangeSourceError> {
        let url = Url::parse(&config.url)
            .map_err(|err| RangeSourceError::Transport(format!("invalid url: {err}")))?;
        match url.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            scheme => {
                return Err(RangeSourceError::Transport(format!("unsupported scheme: {scheme}")));
            }
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(RangeSourceError::Transport(
                "url credentials are not allowed".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| RangeSourceError::Transport("http client build failed".to_string()))?;
        Ok(Self {
            config,
            url,
            client,
        })
    }
}

impl RangeSource for HttpRangeSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn category(&self) -> RangeCategory {
        self.config.category
    }

    fn fetch(&self) -> Result<Vec<IpNet>, RangeSourceError> {
        let mut response = self
            .client
            .get(self.url.clone())
            .send()
            .map_err(|err| RangeSourceError::Transport(err.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RangeSourceError::Status(status.as_u16()));
        }
        let body = read_response_limited(&mut response, self.config.max_response_bytes)?;
        let networks = parse_range_document(&body, &self.config.shape)?;
        debug!(source = %self.config.name, ranges = networks.len(), "fetched published ranges");
        Ok(networks)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, RangeSourceError> {
    let expected_len = response.content_length();
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| RangeSourceError::Transport("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = expected_len
        && expected > max_bytes_u64
    {
        return Err(RangeSourceError::Transport("response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    let mut handle = response.take(max_bytes_u64.saturating_add(1));
    handle
        .read_to_end(&mut buf)
        .map_err(|_| RangeSourceError::Transport("failed to read response".to_string()))?;
    if buf.len() > max_bytes {
        return Err(RangeSourceError::Transport("response exceeds size limit".to_string()));
    }
    if let Some(expected) = expected_len {
        let expected = usize::try_from(expected)
            .map_err(|_| RangeSourceError::Transport("invalid response length".to_string()))?;
        if buf.len() < expected {
            return Err(RangeSourceError::Transport("response truncated".to_string()));
        }
    }
    Ok(buf)
}
