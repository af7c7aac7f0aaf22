//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the crawler's user agent
//! - Robots.txt gating and throttle pacing before every request
//! - Following redirects hop by hop, re-checking robots.txt on each hop
//! - Reading bodies only for HTML, up to a size cap
//! - Error classification into page-level failures

use crate::config::UserAgentConfig;
use crate::crawler::parser::{parse_html, ExtractedImage, ExtractedLink};
use crate::crawler::throttle::FetchThrottle;
use crate::robots::RobotsPolicy;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// Connect timeout applied to every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect hops followed before a fetch fails
pub const MAX_REDIRECTS: usize = 10;

/// Bodies longer than this are truncated
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// A successfully fetched page and everything extracted from it
#[derive(Debug, Clone)]
pub struct PageResult {
    /// The URL that was requested
    pub url: Url,
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub word_count: u32,
    /// Bytes read for HTML, the declared `Content-Length` otherwise
    pub content_length: u64,
    pub load_time_ms: u64,
    /// Empty for non-HTML responses
    pub links: Vec<ExtractedLink>,
    /// Empty for non-HTML responses
    pub images: Vec<ExtractedImage>,
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Request exceeded the configured timeout
    Timeout,
    /// DNS, connection, TLS or redirect failure
    Network,
    /// A redirect pointed at a URL robots.txt disallows
    Disallowed,
    /// Server answered with a non-2xx status
    HttpStatus,
    /// The response body could not be read
    Body,
}

/// A page-level fetch failure; never fatal to the crawl by itself
#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    /// HTTP status if the server answered
    pub status_code: Option<u16>,
    pub message: String,
    pub load_time_ms: u64,
}

impl FetchError {
    /// Returns true when no HTTP response was received at all
    pub fn is_network_level(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Timeout | FetchErrorKind::Network)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FetchError {}

/// Result of fetching one frontier URL
#[derive(Debug)]
pub enum FetchOutcome {
    /// Page fetched (HTML or not)
    Fetched(PageResult),
    /// Robots.txt disallows the URL; no request was made
    Skipped { reason: String },
    /// Request issued but failed
    Failed(FetchError),
}

/// A successful GET after redirects
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Empty when the body was not read
    pub body: String,
    /// Bytes read, or the declared length when the body was not read
    pub content_length: u64,
    pub load_time_ms: u64,
}

impl RawResponse {
    pub fn is_html(&self) -> bool {
        is_html_content_type(self.content_type.as_deref())
    }
}

/// Formats the user agent header: `Name/Version (+ContactURL)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{})",
        config.crawler_name, config.crawler_version, config.contact_url
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use crawl_lab::config::UserAgentConfig;
/// use crawl_lab::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

fn is_html_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        // Servers that omit the header are treated as serving HTML
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml+xml")
        }
    }
}

/// Resolves the `Location` of a 3xx response against the URL that was requested
///
/// Returns `None` for anything that is not a usable redirect.
pub fn redirect_target(response: &Response, current: &Url) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| response.content_length())
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn classify_request_error(url: &Url, error: &reqwest::Error, load_time_ms: u64) -> FetchError {
    let (kind, message) = if error.is_timeout() {
        (FetchErrorKind::Timeout, format!("Request timeout for {}", url))
    } else if error.is_connect() {
        (
            FetchErrorKind::Network,
            format!("Connection failed for {}: {}", url, error),
        )
    } else if error.is_redirect() {
        (
            FetchErrorKind::Network,
            format!("Redirect error for {}: {}", url, error),
        )
    } else {
        (
            FetchErrorKind::Network,
            format!("Request failed for {}: {}", url, error),
        )
    };

    FetchError {
        kind,
        status_code: error.status().map(|s| s.as_u16()),
        message,
        load_time_ms,
    }
}

/// Which responses get their body read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    Always,
    HtmlOnly,
}

/// Fetches pages for one job under its robots policy and throttle
#[derive(Debug, Clone, Copy)]
pub struct PageFetcher<'a> {
    client: &'a Client,
    policy: &'a RobotsPolicy,
    max_body_bytes: usize,
}

impl<'a> PageFetcher<'a> {
    pub fn new(client: &'a Client, policy: &'a RobotsPolicy) -> Self {
        Self {
            client,
            policy,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    /// Overrides [`MAX_BODY_BYTES`]
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Returns true if robots.txt allows fetching `url`
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.policy.is_allowed(url.as_str())
    }

    /// Fetches a document (sitemap XML and the like) and always reads its body
    ///
    /// Every hop waits on the throttle; nothing is charged against the page
    /// budget. Robots.txt is checked on redirect targets only.
    pub async fn get(
        &self,
        url: &Url,
        throttle: &mut FetchThrottle,
    ) -> Result<RawResponse, FetchError> {
        self.request(url, throttle, BodyMode::Always).await
    }

    /// Fetches a page, charging one unit of page budget
    ///
    /// The body is only read for HTML; other content types report the
    /// declared length without downloading anything.
    pub async fn get_page(
        &self,
        url: &Url,
        throttle: &mut FetchThrottle,
    ) -> Result<RawResponse, FetchError> {
        throttle.charge();
        self.request(url, throttle, BodyMode::HtmlOnly).await
    }

    async fn request(
        &self,
        url: &Url,
        throttle: &mut FetchThrottle,
        mode: BodyMode,
    ) -> Result<RawResponse, FetchError> {
        let start = Instant::now();
        let mut current = url.clone();
        let mut hops = 0;

        let response = loop {
            throttle.wait().await;
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| classify_request_error(&current, &e, elapsed_ms(start)))?;

            let Some(next) = redirect_target(&response, &current) else {
                break response;
            };

            let status_code = Some(response.status().as_u16());
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(FetchError {
                    kind: FetchErrorKind::Network,
                    status_code,
                    message: format!("Too many redirects for {}", url),
                    load_time_ms: elapsed_ms(start),
                });
            }
            if !self.is_allowed(&next) {
                return Err(FetchError {
                    kind: FetchErrorKind::Disallowed,
                    status_code,
                    message: format!("Redirect from {} to {} disallowed by robots.txt", url, next),
                    load_time_ms: elapsed_ms(start),
                });
            }

            tracing::debug!(from = %current, to = %next, "Following redirect");
            current = next;
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if !status.is_success() {
            return Err(FetchError {
                kind: FetchErrorKind::HttpStatus,
                status_code: Some(status.as_u16()),
                message: format!("HTTP {} for {}", status.as_u16(), url),
                load_time_ms: elapsed_ms(start),
            });
        }

        if mode == BodyMode::HtmlOnly && !is_html_content_type(content_type.as_deref()) {
            return Ok(RawResponse {
                final_url: current,
                status_code: status.as_u16(),
                content_type,
                body: String::new(),
                content_length: declared_length(&response).unwrap_or(0),
                load_time_ms: elapsed_ms(start),
            });
        }

        let bytes = self.read_body(response, url, start).await?;
        Ok(RawResponse {
            final_url: current,
            status_code: status.as_u16(),
            content_type,
            content_length: bytes.len() as u64,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            load_time_ms: elapsed_ms(start),
        })
    }

    /// Reads the body chunk by chunk, stopping at the size cap
    async fn read_body(
        &self,
        mut response: Response,
        url: &Url,
        start: Instant,
    ) -> Result<Vec<u8>, FetchError> {
        let status_code = response.status().as_u16();
        let mut body = Vec::new();

        loop {
            let chunk = response.chunk().await.map_err(|e| FetchError {
                kind: if e.is_timeout() {
                    FetchErrorKind::Timeout
                } else {
                    FetchErrorKind::Body
                },
                status_code: Some(status_code),
                message: format!("Failed to read body of {}: {}", url, e),
                load_time_ms: elapsed_ms(start),
            })?;
            let Some(chunk) = chunk else {
                return Ok(body);
            };

            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!(url = %url, limit = self.max_body_bytes, "Response body truncated");
                return Ok(body);
            }
            body.extend_from_slice(&chunk);
        }
    }

    /// Fetches one frontier URL and extracts its links, images and metadata
    ///
    /// # Flow
    ///
    /// 1. Robots.txt disallows → `Skipped` (no request, no budget charge)
    /// 2. Charge the budget, then issue the GET and follow redirects; a hop
    ///    into a disallowed path → `Skipped`
    /// 3. Non-2xx, timeout or network error → `Failed`
    /// 4. HTML → parse; anything else → page with no links or images
    pub async fn fetch(&self, url: &Url, throttle: &mut FetchThrottle) -> FetchOutcome {
        if !self.is_allowed(url) {
            return FetchOutcome::Skipped {
                reason: format!("Disallowed by robots.txt: {}", url),
            };
        }

        let raw = match self.get_page(url, throttle).await {
            Ok(raw) => raw,
            Err(e) if e.kind == FetchErrorKind::Disallowed => {
                return FetchOutcome::Skipped { reason: e.message }
            }
            Err(e) => return FetchOutcome::Failed(e),
        };

        let mut page = PageResult {
            url: url.clone(),
            final_url: raw.final_url.clone(),
            status_code: raw.status_code,
            content_type: raw.content_type.clone(),
            title: None,
            meta_description: None,
            h1: None,
            word_count: 0,
            content_length: raw.content_length,
            load_time_ms: raw.load_time_ms,
            links: Vec::new(),
            images: Vec::new(),
        };

        if raw.is_html() {
            let parsed = parse_html(&raw.body, &raw.final_url);
            page.title = parsed.title;
            page.meta_description = parsed.meta_description;
            page.h1 = parsed.h1;
            page.word_count = parsed.word_count;
            page.links = parsed.links;
            page.images = parsed.images;
        }

        FetchOutcome::Fetched(page)
    }
}
