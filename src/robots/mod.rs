//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files,
//! and the gate the crawler consults before every fetch.

mod cache;
mod gate;
mod parser;

pub use cache::RobotsCacheEntry;
pub use gate::RobotsGate;
pub use parser::ParsedRobots;

use crate::CrawlError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Timeout for a single robots.txt request
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Retrieves raw robots.txt content for a domain
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Fetches robots.txt for `domain`
    ///
    /// Any error (unreachable host, non-success status) is treated by the gate
    /// as "rules unavailable".
    async fn fetch(&self, domain: &str) -> Result<String, CrawlError>;
}

/// Fetches robots.txt over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpRobotsSource {
    client: Client,
    scheme: String,
}

impl HttpRobotsSource {
    /// Builds a source requesting `https://{domain}/robots.txt`
    ///
    /// # Arguments
    ///
    /// * `user_agent` - User agent header sent with the request
    pub fn new(user_agent: &str) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(ROBOTS_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
        })
    }

    /// Uses `scheme` instead of `https` when building robots.txt URLs
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    fn robots_url(&self, domain: &str) -> String {
        format!("{}://{}/robots.txt", self.scheme, domain)
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn fetch(&self, domain: &str) -> Result<String, CrawlError> {
        let url = self.robots_url(domain);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| CrawlError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Robots(format!("{} returned HTTP {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|source| CrawlError::Http { url, source })
    }
}
