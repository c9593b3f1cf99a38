//! Crawler module for scheduling and fetching tasks
//!
//! This module contains the core crawling logic, including:
//! - Lease-based task claiming and queue maintenance
//! - Per-domain adaptive rate limiting
//! - Page fetching with retry and backoff
//! - Block-signal classification
//! - Overall crawl orchestration

mod backoff;
mod fetcher;
mod orchestrator;
mod rate_limiter;
mod scheduler;
mod signals;

pub use backoff::{random_pause, RetryPolicy};
pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use orchestrator::{CrawlOrchestrator, CrawlTarget, GateDecision, SkipReason, TaskOutcome};
pub use rate_limiter::DomainRateLimiter;
pub use scheduler::{TaskScheduler, DEFAULT_CLAIM_OVERSAMPLE};
pub use signals::BlockClassifier;
