//! Robots policy gate with a per-domain TTL cache

use crate::clock::Clock;
use crate::config::RobotsConfig;
use crate::robots::{ParsedRobots, RobotsCacheEntry, RobotsSource};
use crate::url::extract_domain;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Decides whether URLs may be fetched under each domain's robots.txt
///
/// One gate is constructed per run and shared by every worker. Rules are
/// cached per domain until `cache-ttl` elapses on the injected clock. A failed
/// fetch is never cached; the configured fail-open default is returned instead.
pub struct RobotsGate {
    config: RobotsConfig,
    source: Arc<dyn RobotsSource>,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, RobotsCacheEntry>>,
}

impl RobotsGate {
    pub fn new(config: RobotsConfig, source: Arc<dyn RobotsSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            source,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether `url` may be fetched
    ///
    /// # Returns
    ///
    /// * `true` - Robots checking is disabled, the rules allow the URL, or the
    ///   rules could not be fetched and the gate fails open
    /// * `false` - Otherwise
    pub async fn allowed(&self, url: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let Some(domain) = extract_domain(url) else {
            return self.config.fail_open;
        };

        match self.rules_for(&domain).await {
            Some(rules) => {
                let allowed = rules.is_allowed(url, &self.config.user_agent);
                debug!("robots.txt for {} {} {}", domain, verdict(allowed), url);
                allowed
            }
            None => self.config.fail_open,
        }
    }

    /// Returns cached rules for `domain`, fetching them if absent or expired
    async fn rules_for(&self, domain: &str) -> Option<ParsedRobots> {
        let now = self.clock.now();
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(domain) {
                if !entry.is_expired(now) {
                    return Some(entry.rules.clone());
                }
            }
        }

        let content = match self.source.fetch(domain).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Failed to fetch robots.txt for {}: {} (fail-open: {})",
                    domain, e, self.config.fail_open
                );
                return None;
            }
        };

        let rules = ParsedRobots::from_content(&content);
        let ttl = Duration::seconds(self.config.cache_ttl.min(i64::MAX as u64 / 1000) as i64);
        let entry = RobotsCacheEntry::new(rules.clone(), self.clock.now(), ttl);

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(domain.to_string(), entry);

        Some(rules)
    }
}

fn verdict(allowed: bool) -> &'static str {
    if allowed {
        "allows"
    } else {
        "disallows"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::CrawlError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        content: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn serving(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: Some(content.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                content: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RobotsSource for FakeSource {
        async fn fetch(&self, domain: &str) -> crate::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.content
                .clone()
                .ok_or_else(|| CrawlError::Robots(format!("{} unreachable", domain)))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn config(fail_open: bool) -> RobotsConfig {
        RobotsConfig {
            enabled: true,
            user_agent: "LeasecrawlBot".to_string(),
            cache_ttl: 60,
            fail_open,
        }
    }

    #[tokio::test]
    async fn test_disabled_allows_without_fetching() {
        let source = FakeSource::serving("User-agent: *\nDisallow: /");
        let mut cfg = config(false);
        cfg.enabled = false;
        let gate = RobotsGate::new(cfg, source.clone(), clock());

        assert!(gate.allowed("https://example.com/page").await);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_rules_are_applied() {
        let source = FakeSource::serving("User-agent: *\nDisallow: /private");
        let gate = RobotsGate::new(config(true), source.clone(), clock());

        assert!(gate.allowed("https://example.com/public").await);
        assert!(!gate.allowed("https://example.com/private/x").await);
    }

    #[tokio::test]
    async fn test_fail_open_default() {
        let gate = RobotsGate::new(config(true), FakeSource::failing(), clock());
        assert!(gate.allowed("https://example.com/page").await);
    }

    #[tokio::test]
    async fn test_fail_closed_default() {
        let gate = RobotsGate::new(config(false), FakeSource::failing(), clock());
        assert!(!gate.allowed("https://example.com/page").await);
    }

    #[tokio::test]
    async fn test_cached_until_ttl() {
        let source = FakeSource::serving("User-agent: *\nAllow: /");
        let clock = clock();
        let gate = RobotsGate::new(config(true), source.clone(), clock.clone());

        gate.allowed("https://example.com/a").await;
        gate.allowed("https://example.com/b").await;
        assert_eq!(source.calls(), 1);

        clock.advance(Duration::seconds(61));
        gate.allowed("https://example.com/c").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_is_per_domain() {
        let source = FakeSource::serving("User-agent: *\nAllow: /");
        let gate = RobotsGate::new(config(true), source.clone(), clock());

        gate.allowed("https://a.example.com/").await;
        gate.allowed("https://b.example.com/").await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let source = FakeSource::failing();
        let gate = RobotsGate::new(config(true), source.clone(), clock());

        gate.allowed("https://example.com/a").await;
        gate.allowed("https://example.com/b").await;
        assert_eq!(source.calls(), 2);
    }
}
