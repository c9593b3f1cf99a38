//! Integration tests for the crawler
//!
//! These tests share an on-disk task store between schedulers and use wiremock
//! to run full crawl batches against mock HTTP servers.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use flate2::read::GzDecoder;
use leasecrawl::clock::{Clock, ManualClock, SystemClock};
use leasecrawl::config::Config;
use leasecrawl::crawler::{CrawlOrchestrator, CrawlTarget, HttpFetcher, TaskScheduler};
use leasecrawl::output::BatchSummary;
use leasecrawl::robots::HttpRobotsSource;
use leasecrawl::state::TaskStatus;
use leasecrawl::storage::{
    LocalContentStore, SqliteTaskStore, TaskQuery, TaskRecord, TaskStore, TaskTags,
};
use leasecrawl::url::url_hash;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a config with pacing shrunk for tests
fn create_test_config(db_path: &Path, content_dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.max_concurrent = 4;
    config.crawler.min_delay = 0.0;
    config.crawler.max_delay = 0.0;
    config.crawler.retries = 2;
    config.crawler.cooldown_min = 0.0;
    config.crawler.cooldown_max = 0.0;
    config.crawler.page_timeout_ms = 5_000;
    config.rate_limit.domain_delay_base = 0.001;
    config.rate_limit.domain_delay_max = 0.01;
    config.storage.database_path = db_path.to_string_lossy().to_string();
    config.storage.content_dir = content_dir.to_string_lossy().to_string();
    config
}

fn open_store(path: &Path) -> Arc<SqliteTaskStore> {
    Arc::new(SqliteTaskStore::new(path).expect("Failed to open task store"))
}

fn test_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn tasks_with_status(store: &dyn TaskStore, status: TaskStatus) -> Vec<TaskRecord> {
    store
        .query(&TaskQuery::with_status(status, 1_000))
        .expect("Query failed")
}

#[test]
fn test_at_most_one_claim_across_processes() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tasks.db");

    let urls: Vec<String> = (0..40)
        .map(|i| format!("https://site{}.example.com/page", i))
        .collect();
    let seed = TaskScheduler::new(open_store(&db_path), Arc::new(SystemClock));
    assert_eq!(seed.enqueue(&urls, false, &TaskTags::default()).unwrap(), 40);

    // Each worker opens its own connection, as separate processes would
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let db_path = db_path.clone();
            std::thread::spawn(move || {
                let scheduler = TaskScheduler::new(open_store(&db_path), Arc::new(SystemClock));
                let mut keys = Vec::new();
                for _ in 0..5 {
                    let claimed = scheduler.claim(5, 600).expect("Claim failed");
                    keys.extend(claimed.into_iter().map(|task| task.key));
                }
                keys
            })
        })
        .collect();

    let mut all_keys = Vec::new();
    for worker in workers {
        all_keys.extend(worker.join().unwrap());
    }

    let unique: HashSet<_> = all_keys.iter().collect();
    assert_eq!(unique.len(), all_keys.len(), "A task was claimed twice");

    let store = open_store(&db_path);
    let running = tasks_with_status(store.as_ref(), TaskStatus::Running);
    assert_eq!(running.len(), all_keys.len());
    for task in running {
        assert!(task.locked_at.is_some());
        assert!(task.locked_until.is_some());
    }
}

#[test]
fn test_single_task_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tasks.db");

    let seed = TaskScheduler::new(open_store(&db_path), Arc::new(SystemClock));
    seed.enqueue(["https://example.com/only"], false, &TaskTags::default())
        .unwrap();

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let db_path = db_path.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let scheduler = TaskScheduler::new(open_store(&db_path), Arc::new(SystemClock));
                barrier.wait();
                scheduler.claim(1, 600).expect("Claim failed").len()
            })
        })
        .collect();

    let claimed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(claimed, 1);
}

#[test]
fn test_expired_lease_is_reclaimed_and_claimable() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("tasks.db"));
    let clock = Arc::new(ManualClock::new(test_start()));
    let scheduler = TaskScheduler::new(store.clone(), clock.clone());

    scheduler
        .enqueue(["https://example.com/a"], false, &TaskTags::default())
        .unwrap();

    let first = scheduler.claim(1, 60).unwrap();
    assert_eq!(first.len(), 1);
    assert!(scheduler.claim(1, 60).unwrap().is_empty());

    // Still leased: nothing to reclaim
    clock.advance(ChronoDuration::seconds(30));
    assert_eq!(scheduler.reclaim_expired_leases(10, clock.now()).unwrap(), 0);

    clock.advance(ChronoDuration::seconds(31));
    assert_eq!(scheduler.reclaim_expired_leases(10, clock.now()).unwrap(), 1);

    let task = store.get(&first[0].key).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.locked_until.is_none());
    assert_eq!(task.reclaimed_at, Some(clock.now()));

    let second = scheduler.claim(1, 60).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].key, first[0].key);
}

#[test]
fn test_stale_error_tasks_are_requeued() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("tasks.db"));
    let clock = Arc::new(ManualClock::new(test_start()));
    let scheduler = TaskScheduler::new(store.clone(), clock.clone());

    for (url, age_hours) in [("https://old.com/", 48), ("https://fresh.com/", 1)] {
        let hash = url_hash(url).unwrap();
        let mut task = TaskRecord::new_pending(
            hash.clone(),
            url,
            url.trim_end_matches('/'),
            hash,
            TaskTags::default(),
            test_start() - ChronoDuration::hours(72),
        );
        task.status = TaskStatus::Error;
        task.error_log = Some("Timed out".to_string());
        task.last_error = Some("Timed out".to_string());
        task.failed_at = Some(test_start() - ChronoDuration::hours(age_hours));
        store.set(&task).unwrap();
    }

    let cutoff = clock.now() - ChronoDuration::hours(24);
    assert_eq!(scheduler.requeue_error_tasks(cutoff, 100).unwrap(), 1);

    let old = store.get(&url_hash("https://old.com/").unwrap()).unwrap().unwrap();
    assert_eq!(old.status, TaskStatus::Pending);
    assert!(old.error_log.is_none());
    assert!(old.last_error.is_none());
    assert_eq!(old.requeued_at, Some(clock.now()));

    let fresh = store.get(&url_hash("https://fresh.com/").unwrap()).unwrap().unwrap();
    assert_eq!(fresh.status, TaskStatus::Error);
}

#[test]
fn test_enqueue_is_idempotent_per_normalized_url() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("tasks.db"));
    let scheduler = TaskScheduler::new(store.clone(), Arc::new(SystemClock));
    let tags = TaskTags::default();

    let created = scheduler
        .enqueue(["https://Example.com/a/", "https://example.com/a", "  "], false, &tags)
        .unwrap();
    assert_eq!(created, 1);
    assert_eq!(
        scheduler.enqueue(["https://example.com/a"], false, &tags).unwrap(),
        0
    );

    // Forced duplicates get their own document
    assert_eq!(
        scheduler.enqueue(["https://example.com/a"], true, &tags).unwrap(),
        1
    );

    let pending = tasks_with_status(store.as_ref(), TaskStatus::Pending);
    assert_eq!(pending.len(), 2);
    assert!(pending
        .iter()
        .all(|task| task.url_hash == url_hash("https://example.com/a").unwrap()));
}

#[tokio::test]
async fn test_full_batch_over_http() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Product</title></head><body>Hi</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/challenge"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_string("<html><body>Please complete the CAPTCHA</body></html>"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tasks.db");
    let content_dir = dir.path().join("raw_html");
    let config = create_test_config(&db_path, &content_dir);

    let store = open_store(&db_path);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = TaskScheduler::new(store.clone(), clock.clone());

    let tags = TaskTags {
        brand: Some("acme".to_string()),
        ..Default::default()
    };
    let urls = [
        format!("{}/ok", base_url),
        format!("{}/challenge", base_url),
        format!("{}/private", base_url),
        // Nothing listens on the discard port
        "http://127.0.0.1:9/down".to_string(),
    ];
    assert_eq!(scheduler.enqueue(&urls, false, &tags).unwrap(), 4);

    let claimed = scheduler.claim(10, 600).unwrap();
    assert_eq!(claimed.len(), 4);
    let targets: Vec<_> = claimed.iter().map(CrawlTarget::from_record).collect();

    let orchestrator = CrawlOrchestrator::new(
        config.clone(),
        store.clone(),
        Arc::new(LocalContentStore::new(&content_dir)),
        Arc::new(HttpFetcher::new(&config.crawler).unwrap()),
        Arc::new(
            HttpRobotsSource::new(&config.robots.user_agent)
                .unwrap()
                .with_scheme("http"),
        ),
        clock,
    );

    let results = orchestrator.run_batch(&targets).await;
    let summary = BatchSummary::from_results(&results);
    assert_eq!(
        summary,
        BatchSummary {
            total: 4,
            succeeded: 2,
            blocked_suspected: 1,
            skipped: 1,
            failed: 1,
            lease_lost: 0,
            hard_failures: 0,
        }
    );

    let get = |url: &str| store.get(&url_hash(url).unwrap()).unwrap().unwrap();

    let ok = get(&urls[0]);
    assert_eq!(ok.status, TaskStatus::Downloaded);
    assert_eq!(ok.title.as_deref(), Some("Product"));
    assert_eq!(ok.response_status, Some(200));
    assert!(!ok.blocked_suspected);
    assert_eq!(ok.fetch_attempts, 1);
    assert_eq!(ok.tags.brand.as_deref(), Some("acme"));
    assert!(ok.locked_until.is_none());

    let storage_ref = ok.storage_ref.expect("Content was not stored");
    assert!(storage_ref.ends_with(".html.gz"));
    let mut body = String::new();
    GzDecoder::new(std::fs::File::open(&storage_ref).unwrap())
        .read_to_string(&mut body)
        .unwrap();
    assert!(body.contains("<title>Product</title>"));

    let challenge = get(&urls[1]);
    assert_eq!(challenge.status, TaskStatus::Downloaded);
    assert!(challenge.blocked_suspected);
    assert_eq!(challenge.block_signals, vec!["http_403", "captcha"]);
    assert!(challenge.storage_ref.is_some());

    let private = get(&urls[2]);
    assert_eq!(private.status, TaskStatus::Skipped);
    assert_eq!(private.skip_reason.as_deref(), Some("robots_disallow"));

    // robots.txt is unreachable too, so the gate fails open and the fetch is retried
    let down = get(&urls[3]);
    assert_eq!(down.status, TaskStatus::Error);
    assert_eq!(down.fetch_attempts, 2);
    assert!(down.last_error.is_some());
    assert!(down.failed_at.is_some());
    assert!(down.locked_until.is_none());
}

#[tokio::test]
async fn test_ad_hoc_batch_respects_domain_gate() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Page</title></head></html>"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tasks.db");
    let content_dir = dir.path().join("raw_html");
    let mut config = create_test_config(&db_path, &content_dir);
    config.domains.deny = vec!["*.blocked.test".to_string()];

    let store = open_store(&db_path);
    let orchestrator = CrawlOrchestrator::new(
        config.clone(),
        store.clone(),
        Arc::new(LocalContentStore::new(&content_dir)),
        Arc::new(HttpFetcher::new(&config.crawler).unwrap()),
        Arc::new(
            HttpRobotsSource::new(&config.robots.user_agent)
                .unwrap()
                .with_scheme("http"),
        ),
        Arc::new(SystemClock),
    );

    let allowed_url = format!("{}/page", server.uri());
    let targets = vec![
        CrawlTarget::from_url(allowed_url.clone(), TaskTags::default()),
        CrawlTarget::from_url("https://shop.blocked.test/item", TaskTags::default()),
    ];
    let results = orchestrator.run_batch(&targets).await;

    let fetched = results[0].as_ref().unwrap();
    assert!(fetched.success);
    let page = store.get(&fetched.key).unwrap().unwrap();
    assert_eq!(page.status, TaskStatus::Downloaded);
    assert_eq!(page.url_hash, url_hash(&allowed_url).unwrap());

    let skipped = results[1].as_ref().unwrap();
    assert_eq!(skipped.status, TaskStatus::Skipped);

    // Ad-hoc targets get documents of their own, never the queue entry's key
    assert_ne!(skipped.key, url_hash("https://shop.blocked.test/item").unwrap());
    let task = store.get(&skipped.key).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Skipped);
    assert_eq!(task.skip_reason.as_deref(), Some("domain_not_allowed"));
    assert_eq!(task.url, "https://shop.blocked.test/item");
}

#[tokio::test]
async fn test_stale_outcome_does_not_clobber_new_lease() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Slow</title>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tasks.db");
    let content_dir = dir.path().join("raw_html");
    let config = create_test_config(&db_path, &content_dir);

    let clock = Arc::new(ManualClock::new(test_start()));
    let store = open_store(&db_path);
    let scheduler = TaskScheduler::new(store.clone(), clock.clone());
    let url = format!("{}/slow", server.uri());
    scheduler.enqueue([&url], false, &TaskTags::default()).unwrap();

    let first = scheduler.claim(1, 30).unwrap();
    clock.advance(ChronoDuration::seconds(31));
    assert_eq!(scheduler.reclaim_expired_leases(10, clock.now()).unwrap(), 1);

    // Another process re-claims the task while the first worker is still fetching
    let other = open_store(&db_path);
    let second = TaskScheduler::new(other, clock.clone()).claim(1, 30).unwrap();
    assert_eq!(second.len(), 1);

    let orchestrator = CrawlOrchestrator::new(
        config.clone(),
        store.clone(),
        Arc::new(LocalContentStore::new(&content_dir)),
        Arc::new(HttpFetcher::new(&config.crawler).unwrap()),
        Arc::new(
            HttpRobotsSource::new(&config.robots.user_agent)
                .unwrap()
                .with_scheme("http"),
        ),
        clock.clone(),
    );
    let results = orchestrator
        .run_batch(&[CrawlTarget::from_record(&first[0])])
        .await;

    assert!(results[0].as_ref().unwrap().lease_lost);
    let summary = BatchSummary::from_results(&results);
    assert_eq!(summary.lease_lost, 1);
    assert_eq!(summary.hard_failures, 0);

    let task = store.get(&first[0].key).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.locked_until, second[0].locked_until);
}
