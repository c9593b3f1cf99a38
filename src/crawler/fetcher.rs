//! Page fetching
//!
//! This module defines the fetcher contract the orchestrator drives, and an
//! HTTP implementation of it:
//! - Building HTTP clients with the configured user agent
//! - GET requests bounded by a per-attempt timeout
//! - Title extraction
//! - Error classification into transient failure kinds

use crate::config::CrawlerConfig;
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Maximum redirects followed for one page
const MAX_REDIRECTS: usize = 10;

/// A page returned by a fetcher
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Page body
    pub content: String,

    /// HTTP status of the final response, if the fetcher observed one
    pub http_status: Option<u16>,

    /// Page title (empty if none)
    pub title: String,

    /// Time from request start to body received
    pub latency_ms: u64,
}

/// Transient fetch failures
///
/// Every variant is retried by the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Retrieves a page
///
/// A fetcher must not keep state between calls: every call is an independent
/// attempt.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent header value
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with a plain HTTP GET
///
/// Non-success responses are returned as pages carrying their status, so that
/// block classification can see 403 and 429 responses.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            client: build_http_client(&config.user_agent)?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status().as_u16();
        let content = response
            .text()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let latency_ms = start.elapsed().as_millis().min(u64::MAX as u128) as u64;
        let title = extract_title(&content).unwrap_or_default();

        Ok(FetchedPage {
            content,
            http_status: Some(status),
            title,
            latency_ms,
        })
    }
}

/// Maps a reqwest error onto a transient failure kind
fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout.as_millis().min(u64::MAX as u128) as u64)
    } else if error.is_redirect() || error.is_builder() {
        FetchError::Navigation(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}

/// Extracts the page title from an HTML document
fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
