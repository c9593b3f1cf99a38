//! Bounded-concurrency crawl driver
//!
//! For each target the orchestrator:
//! 1. Applies the allow/deny domain gate, then robots.txt
//! 2. Retries the fetch with per-domain pacing, jitter and backoff
//! 3. Classifies block signals and stores the content
//! 4. Writes the terminal task state back to the store

use crate::clock::Clock;
use crate::config::Config;
use crate::crawler::backoff::{random_pause, RetryPolicy};
use crate::crawler::fetcher::{FetchError, FetchedPage, Fetcher};
use crate::crawler::rate_limiter::DomainRateLimiter;
use crate::crawler::signals::BlockClassifier;
use crate::robots::{RobotsGate, RobotsSource};
use crate::state::TaskStatus;
use crate::storage::{
    gzip_bytes, ContentStore, StorageResult, TaskRecord, TaskStore, TaskTags, TaskUpdate,
};
use crate::url::{extract_domain, hash_normalized, is_domain_allowed, normalize_url};
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A URL to crawl, optionally backed by an existing task document
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub url: String,
    /// Key of the claimed task; None for ad-hoc targets
    pub key: Option<String>,
    /// End of the lease the task was claimed under
    pub lease: Option<DateTime<Utc>>,
    pub tags: TaskTags,
}

impl CrawlTarget {
    /// Targets a claimed task
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            url: record.url.clone(),
            key: Some(record.key.clone()),
            lease: record.locked_until,
            tags: record.tags.clone(),
        }
    }

    /// Targets a URL with no task document yet
    ///
    /// The outcome is written to a new document with a random key, so
    /// queued tasks for the same URL are never touched.
    pub fn from_url(url: impl Into<String>, tags: TaskTags) -> Self {
        Self {
            url: url.into(),
            key: None,
            lease: None,
            tags,
        }
    }

    /// Fills blank tags from `defaults`
    pub fn with_default_tags(mut self, defaults: &TaskTags) -> Self {
        self.tags = self.tags.or_defaults(defaults);
        self
    }
}

/// Why a target was skipped without fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DomainNotAllowed,
    RobotsDisallowed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DomainNotAllowed => "domain_not_allowed",
            Self::RobotsDisallowed => "robots_disallow",
        }
    }
}

/// Result of the pre-fetch policy checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Rejected(SkipReason),
}

/// Result of one fetch attempt
#[derive(Debug)]
enum AttemptOutcome {
    Fetched(FetchedPage),
    Transient(FetchError),
}

/// Final outcome of one target
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub url: String,
    /// Document the outcome was written to
    pub key: String,
    pub status: TaskStatus,
    pub success: bool,
    pub blocked_suspected: bool,
    pub response_status: Option<u16>,
    pub error: Option<String>,
    /// Fetch attempts made
    pub attempts: u32,
    /// The task was reclaimed before its outcome could be written
    pub lease_lost: bool,
}

/// Identity of the document a target's outcome is written to
struct TaskIdentity<'a> {
    target: &'a CrawlTarget,
    key: String,
    normalized_url: String,
    url_hash: String,
}

/// Drives claimed tasks through gating, fetching and persistence
pub struct CrawlOrchestrator {
    config: Arc<Config>,
    store: Arc<dyn TaskStore>,
    content: Arc<dyn ContentStore>,
    fetcher: Arc<dyn Fetcher>,
    robots: RobotsGate,
    limiter: DomainRateLimiter,
    classifier: BlockClassifier,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    semaphore: Semaphore,
}

impl CrawlOrchestrator {
    /// Builds an orchestrator and its per-run caches
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl configuration
    /// * `store` - Task store receiving outcomes
    /// * `content` - Sink for fetched page bodies
    /// * `fetcher` - Page fetcher
    /// * `robots_source` - Where robots.txt is read from
    /// * `clock` - Time source for persisted timestamps and robots TTL
    pub fn new(
        config: Config,
        store: Arc<dyn TaskStore>,
        content: Arc<dyn ContentStore>,
        fetcher: Arc<dyn Fetcher>,
        robots_source: Arc<dyn RobotsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let robots = RobotsGate::new(config.robots.clone(), robots_source, clock.clone());
        let limiter = DomainRateLimiter::new(config.rate_limit.clone());
        let classifier = BlockClassifier::from_config(&config.signals);
        let retry = RetryPolicy::from_config(&config.crawler);
        let semaphore = Semaphore::new(config.crawler.max_concurrent.max(1) as usize);

        Self {
            config: Arc::new(config),
            store,
            content,
            fetcher,
            robots,
            limiter,
            classifier,
            retry,
            clock,
            semaphore,
        }
    }

    /// Processes every target, at most `max-concurrent` at a time
    ///
    /// Returns one entry per target, in input order. An `Err` means the
    /// target's outcome could not be written at all; it never aborts the
    /// other targets.
    pub async fn run_batch(&self, targets: &[CrawlTarget]) -> Vec<Result<TaskOutcome>> {
        info!("Starting crawl batch of {} targets", targets.len());

        let results = join_all(targets.iter().map(|target| self.process(target))).await;

        for (target, result) in targets.iter().zip(&results) {
            if let Err(e) = result {
                warn!("Failed to record outcome for {}: {}", target.url, e);
            }
        }

        results
    }

    /// Runs one target inside a concurrency slot
    async fn process(&self, target: &CrawlTarget) -> Result<TaskOutcome> {
        // The semaphore is never closed
        let _permit = self.semaphore.acquire().await.ok();

        let normalized_url = match normalize_url(&target.url) {
            Ok(normalized) => normalized,
            // An ad-hoc URL that cannot be normalized has no document to record into
            Err(e) => match &target.key {
                Some(key) => {
                    let identity = TaskIdentity {
                        target,
                        key: key.clone(),
                        normalized_url: String::new(),
                        url_hash: String::new(),
                    };
                    return self.record_error(&identity, e.to_string(), 0, None);
                }
                None => return Err(e.into()),
            },
        };
        let url_hash = hash_normalized(&normalized_url);
        let identity = TaskIdentity {
            target,
            key: target
                .key
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            normalized_url,
            url_hash,
        };

        if let GateDecision::Rejected(reason) = self.check_gates(&target.url).await {
            return self.record_skip(&identity, reason);
        }

        let retries = self.config.crawler.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=retries {
            match self.attempt(&target.url).await {
                AttemptOutcome::Fetched(page) => {
                    return self.record_fetched(&identity, page, attempt);
                }
                AttemptOutcome::Transient(e) => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt, retries, target.url, e
                    );
                    last_error = e.to_string();
                    self.limiter.record(&target.url, true);

                    if attempt < retries {
                        let cooldown = self.retry.delay(attempt);
                        debug!("Backing off {:?} before retrying {}", cooldown, target.url);
                        tokio::time::sleep(cooldown).await;
                    }
                }
            }
        }

        self.record_error(&identity, last_error, retries, None)
    }

    /// Evaluates the domain allow/deny lists, then robots.txt
    pub async fn check_gates(&self, url: &str) -> GateDecision {
        let domain = extract_domain(url).unwrap_or_default();
        let domains = &self.config.domains;

        if !is_domain_allowed(&domain, &domains.allow, &domains.deny) {
            return GateDecision::Rejected(SkipReason::DomainNotAllowed);
        }
        if !self.robots.allowed(url).await {
            return GateDecision::Rejected(SkipReason::RobotsDisallowed);
        }
        GateDecision::Allowed
    }

    /// One independent fetch attempt, paced and bounded by the page timeout
    async fn attempt(&self, url: &str) -> AttemptOutcome {
        self.limiter.wait(url).await;

        let crawler = &self.config.crawler;
        let pause = random_pause(crawler.min_delay, crawler.max_delay);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let timeout = Duration::from_millis(crawler.page_timeout_ms);
        match tokio::time::timeout(timeout, self.fetcher.fetch(url, timeout)).await {
            Ok(Ok(page)) => AttemptOutcome::Fetched(page),
            Ok(Err(e)) => AttemptOutcome::Transient(e),
            Err(_) => AttemptOutcome::Transient(FetchError::Timeout(crawler.page_timeout_ms)),
        }
    }

    fn record_skip(&self, identity: &TaskIdentity<'_>, reason: SkipReason) -> Result<TaskOutcome> {
        debug!("Skipping {}: {}", identity.target.url, reason.as_str());

        let update = TaskUpdate {
            skip_reason: Some(Some(reason.as_str().to_string())),
            skipped_at: Some(self.clock.now()),
            ..TaskUpdate::to_status(TaskStatus::Skipped).clear_lease()
        };
        if !self.write(identity, &update)? {
            return Ok(self.lease_lost(identity, TaskStatus::Skipped, None, 0));
        }

        Ok(self.outcome(identity, TaskStatus::Skipped, None, Some(reason.as_str()), 0))
    }

    fn record_fetched(
        &self,
        identity: &TaskIdentity<'_>,
        page: FetchedPage,
        attempt: u32,
    ) -> Result<TaskOutcome> {
        let url = &identity.target.url;
        let signals = self.classifier.classify(&page.content, page.http_status);
        let blocked = !signals.is_empty();

        let storage_ref = match self.store_content(&identity.url_hash, &page.content) {
            Ok(storage_ref) => storage_ref,
            Err(e) => {
                self.limiter.record(url, blocked);
                let message = format!("content store failed: {}", e);
                return self.record_error(identity, message, attempt, page.http_status);
            }
        };

        let update = TaskUpdate {
            title: Some(Some(page.title.clone())),
            storage_ref: Some(Some(storage_ref)),
            response_status: Some(page.http_status),
            block_signals: Some(signals.clone()),
            blocked_suspected: Some(blocked),
            fetch_attempts: Some(attempt),
            fetch_latency_ms: Some(Some(page.latency_ms)),
            last_error: Some(None),
            downloaded_at: Some(self.clock.now()),
            tags: Some(identity.target.tags.clone()),
            ..TaskUpdate::to_status(TaskStatus::Downloaded).clear_lease()
        };

        let written = match self.write(identity, &update) {
            Ok(written) => written,
            Err(e) => {
                self.limiter.record(url, blocked);
                let message = format!("task store write failed: {}", e);
                return self.record_error(identity, message, attempt, page.http_status);
            }
        };

        self.limiter.record(url, blocked);

        if !written {
            return Ok(self.lease_lost(identity, TaskStatus::Downloaded, page.http_status, attempt));
        }

        if blocked {
            info!(
                "Downloaded {} (blocked suspected: {:?}, domain delay now {:.2}s)",
                url,
                signals,
                self.limiter.current_delay_secs(url)
            );
        } else {
            info!("Downloaded {} in {}ms", url, page.latency_ms);
        }

        let mut outcome = self.outcome(
            identity,
            TaskStatus::Downloaded,
            page.http_status,
            None,
            attempt,
        );
        outcome.success = true;
        outcome.blocked_suspected = blocked;
        Ok(outcome)
    }

    fn record_error(
        &self,
        identity: &TaskIdentity<'_>,
        message: String,
        attempts: u32,
        response_status: Option<u16>,
    ) -> Result<TaskOutcome> {
        warn!("Giving up on {}: {}", identity.target.url, message);

        let update = TaskUpdate {
            error_log: Some(Some(message.clone())),
            last_error: Some(Some(message.clone())),
            fetch_attempts: Some(attempts),
            failed_at: Some(self.clock.now()),
            tags: Some(identity.target.tags.clone()),
            ..TaskUpdate::to_status(TaskStatus::Error).clear_lease()
        };
        if !self.write(identity, &update)? {
            return Ok(self.lease_lost(identity, TaskStatus::Error, response_status, attempts));
        }

        Ok(self.outcome(identity, TaskStatus::Error, response_status, Some(&message), attempts))
    }

    /// Writes an outcome to the target's document
    ///
    /// Claimed targets are written only while their document is still running
    /// under the lease they were claimed with. Ad-hoc targets create a fresh
    /// document. Returns false when the write was declined.
    fn write(&self, identity: &TaskIdentity<'_>, update: &TaskUpdate) -> StorageResult<bool> {
        let target = identity.target;
        let now = self.clock.now();

        let written = self.store.transact(&identity.key, &mut |current| {
            let mut record = match (current, &target.key) {
                (Some(task), Some(_)) if task.is_held_under(target.lease) => task.clone(),
                (None, None) => {
                    let mut record = TaskRecord::new_pending(
                        identity.key.clone(),
                        target.url.clone(),
                        identity.normalized_url.clone(),
                        identity.url_hash.clone(),
                        target.tags.clone(),
                        now,
                    );
                    // Ad-hoc targets are fetched without a lease
                    record.status = TaskStatus::Running;
                    record
                }
                _ => return None,
            };

            if let Some(next) = update.status {
                if !record.status.can_transition_to(next) {
                    return None;
                }
            }
            update.apply(&mut record);
            Some(record)
        })?;

        if written.is_none() {
            warn!(
                "Lease on {} was lost; outcome for {} not written",
                identity.key, target.url
            );
        }
        Ok(written.is_some())
    }

    fn store_content(&self, url_hash: &str, content: &str) -> StorageResult<String> {
        // Forced duplicates share a hash and may finish within the same second
        let stem = format!(
            "{}_{}_{}",
            url_hash,
            self.clock.now().timestamp(),
            Uuid::new_v4().simple()
        );
        if self.config.storage.compress {
            let name = format!("{}.html.gz", stem);
            self.content.put(&name, &gzip_bytes(content.as_bytes())?, true)
        } else {
            let name = format!("{}.html", stem);
            self.content.put(&name, content.as_bytes(), false)
        }
    }

    fn lease_lost(
        &self,
        identity: &TaskIdentity<'_>,
        status: TaskStatus,
        response_status: Option<u16>,
        attempts: u32,
    ) -> TaskOutcome {
        let mut outcome = self.outcome(
            identity,
            status,
            response_status,
            Some("lease lost"),
            attempts,
        );
        outcome.lease_lost = true;
        outcome
    }

    fn outcome(
        &self,
        identity: &TaskIdentity<'_>,
        status: TaskStatus,
        response_status: Option<u16>,
        error: Option<&str>,
        attempts: u32,
    ) -> TaskOutcome {
        TaskOutcome {
            url: identity.target.url.clone(),
            key: identity.key.clone(),
            status,
            success: false,
            blocked_suspected: false,
            response_status,
            error: error.map(str::to_string),
            attempts,
            lease_lost: false,
        }
    }
}
