use serde::Deserialize;

/// Default browser-like user agent presented by the HTTP fetcher
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure for Leasecrawl
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub domains: DomainsConfig,
    pub robots: RobotsConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    pub signals: SignalsConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
}

/// Fetch loop behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of tasks processed concurrently
    pub max_concurrent: u32,

    /// Lower bound of the random pre-fetch pause (seconds)
    pub min_delay: f64,

    /// Upper bound of the random pre-fetch pause (seconds)
    pub max_delay: f64,

    /// Fetch attempts per task
    pub retries: u32,

    /// Base of the exponential retry backoff (seconds)
    pub retry_backoff_base: f64,

    /// Cap on the exponential retry backoff (seconds)
    pub retry_backoff_max: f64,

    /// Minimum sleep between attempts (seconds)
    pub cooldown_min: f64,

    /// Maximum sleep between attempts (seconds)
    pub cooldown_max: f64,

    /// Per-attempt fetch timeout (milliseconds)
    pub page_timeout_ms: u64,

    /// User agent presented by the HTTP fetcher
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            min_delay: 2.0,
            max_delay: 5.0,
            retries: 3,
            retry_backoff_base: 1.5,
            retry_backoff_max: 30.0,
            cooldown_min: 5.0,
            cooldown_max: 10.0,
            page_timeout_ms: 30_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Domain allow/deny lists
///
/// Entries are exact hosts ("example.com") or wildcard patterns ("*.example.com").
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainsConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// Robots.txt policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// Whether robots.txt is consulted at all
    pub enabled: bool,

    /// Agent name matched against robots.txt groups
    pub user_agent: String,

    /// How long a fetched robots.txt stays cached (seconds)
    pub cache_ttl: u64,

    /// Verdict used when robots.txt cannot be fetched
    pub fail_open: bool,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: "LeasecrawlBot".to_string(),
            cache_ttl: 3600,
            fail_open: true,
        }
    }
}

/// Per-domain adaptive pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateLimitConfig {
    /// Starting and minimum spacing between requests to one domain (seconds)
    pub domain_delay_base: f64,

    /// Maximum spacing between requests to one domain (seconds)
    pub domain_delay_max: f64,

    /// Multiplier applied to the delay after a blocked response
    pub increase_factor: f64,

    /// Multiplier applied to the delay after a clean response
    pub decrease_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            domain_delay_base: 1.0,
            domain_delay_max: 15.0,
            increase_factor: 1.5,
            decrease_factor: 0.9,
        }
    }
}

/// Block-signal phrases matched case-insensitively against fetched content
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub phrases: Vec<String>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            phrases: [
                "captcha",
                "verify you are human",
                "access denied",
                "forbidden",
                "too many requests",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// Task queue leases and housekeeping
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Default lease length for claimed tasks (seconds)
    pub running_stale_seconds: u64,

    /// Candidate oversampling factor used by claim
    pub claim_oversample: u32,

    /// Requeue analyzed tasks older than this many hours (0 disables)
    pub requeue_analyzed_after_hours: u64,

    /// Requeue downloaded tasks older than this many hours (0 disables)
    pub requeue_downloaded_after_hours: u64,

    /// Requeue error tasks older than this many hours (0 disables)
    pub requeue_error_after_hours: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            running_stale_seconds: 900,
            claim_oversample: 3,
            requeue_analyzed_after_hours: 0,
            requeue_downloaded_after_hours: 0,
            requeue_error_after_hours: 24,
        }
    }
}

/// Persistence locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite task database
    pub database_path: String,

    /// Directory receiving fetched page content
    pub content_dir: String,

    /// Whether fetched content is gzip-compressed on disk
    pub compress: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./leasecrawl.db".to_string(),
            content_dir: "./raw_html".to_string(),
            compress: true,
        }
    }
}

/// Command-line overrides applied on top of a loaded config
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_concurrent: Option<u32>,
    pub min_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub retries: Option<u32>,
    pub user_agent: Option<String>,
}

impl Config {
    /// Returns a copy of this config with the given overrides applied
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Config {
        let mut config = self.clone();
        if let Some(v) = overrides.max_concurrent {
            config.crawler.max_concurrent = v;
        }
        if let Some(v) = overrides.min_delay {
            config.crawler.min_delay = v;
        }
        if let Some(v) = overrides.max_delay {
            config.crawler.max_delay = v;
        }
        if let Some(v) = overrides.retries {
            config.crawler.retries = v;
        }
        if let Some(v) = &overrides.user_agent {
            config.crawler.user_agent = v.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = Config::default();
        let overrides = ConfigOverrides {
            max_concurrent: Some(10),
            user_agent: Some("TestAgent/1.0".to_string()),
            ..Default::default()
        };

        let config = base.with_overrides(&overrides);

        assert_eq!(config.crawler.max_concurrent, 10);
        assert_eq!(config.crawler.user_agent, "TestAgent/1.0");
        assert_eq!(config.crawler.retries, base.crawler.retries);
        assert_eq!(config.crawler.min_delay, base.crawler.min_delay);
        assert_eq!(base.crawler.max_concurrent, 3);
    }
}
