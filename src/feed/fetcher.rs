//! Conditional-GET feed fetcher.
//!
//! One [`FeedFetcher`] is shared process-wide: it owns the HTTP client
//! (connection pool) and the concurrency permit that bounds parallel
//! fetches. Every fetch sends the stored `ETag` / `Last-Modified`
//! validators and reports `304 Not Modified` as [`FetchOutcome::NotModified`]
//! instead of re-parsing an unchanged document.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::feed::parser::{self, FeedMeta, ParsedEntry};

const USER_AGENT: &str = "feedbridge/0.1 (+https://github.com/feedbridge/feedbridge)";
const ACCEPT_FEEDS: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default number of concurrent fetches
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Errors that can occur while fetching a feed.
///
/// All of these are recoverable from the caller's perspective: they are
/// recorded against the feed and the cycle continues.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the total timeout
    #[error("Request timed out")]
    Timeout,
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    /// HTTP response with status >= 400
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Anything else (oversized body, closed fetcher, ...)
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

/// A successfully fetched and parsed feed document.
#[derive(Debug)]
pub struct FetchedFeed {
    pub meta: FeedMeta,
    pub entries: Vec<ParsedEntry>,
    /// New validators from the response, for the next conditional GET
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Outcome of one conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Server answered 304; the stored validators stay valid
    NotModified,
    Fetched(FetchedFeed),
}

/// One URL plus its stored validators, for [`FeedFetcher::fetch_many`].
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Result row of a [`FeedFetcher::fetch_many`] fanout.
#[derive(Debug)]
pub struct MultiFetchResult {
    pub url: String,
    pub result: Result<FetchOutcome, FetchError>,
}

/// Shared HTTP fetcher with bounded concurrency.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl FeedFetcher {
    /// Builds the fetcher and its HTTP client.
    ///
    /// # Errors
    ///
    /// Fails only if the TLS backend cannot be initialized.
    pub fn new(max_concurrent: usize) -> Result<Self, FetchError> {
        let max_concurrent = max_concurrent.max(1);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT_FEEDS));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Unexpected(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        })
    }

    /// The shared HTTP client, for collaborators that talk to other
    /// services (translation providers, adapters).
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Size of the concurrency permit.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Fetches one feed with conditional-GET validators.
    ///
    /// Holds a concurrency permit for the duration of the HTTP exchange.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] kind for timeouts, network failures,
    /// HTTP >= 400, unparseable bodies, and oversized responses.
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Unexpected("fetcher is shut down".to_string()))?;

        self.do_fetch(url, etag, last_modified).await
    }

    async fn do_fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            tracing::debug!(feed = %url, "Feed not modified");
            return Ok(FetchOutcome::NotModified);
        }

        if response.status().as_u16() >= 400 {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let new_etag = header_value(&response, header::ETAG);
        let new_last_modified = header_value(&response, header::LAST_MODIFIED);

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        let parsed = parser::parse_feed(&bytes, url).map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(FetchOutcome::Fetched(FetchedFeed {
            meta: parsed.meta,
            entries: parsed.entries,
            etag: new_etag,
            last_modified: new_last_modified,
        }))
    }

    /// Fetches many feeds in parallel, never exceeding the permit.
    ///
    /// Results come back in completion order, not input order.
    pub async fn fetch_many(&self, requests: Vec<FetchRequest>) -> Vec<MultiFetchResult> {
        stream::iter(requests)
            .map(|req| async move {
                let result = self
                    .fetch(&req.url, req.etag.as_deref(), req.last_modified.as_deref())
                    .await;
                MultiFetchResult { url: req.url, result }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }
}

fn header_value(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when present
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::Unexpected(format!(
                "response body exceeds {} bytes",
                limit
            )));
        }
    }

    let mut bytes = Vec::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(FetchError::from)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::Unexpected(format!(
                "response body exceeds {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
