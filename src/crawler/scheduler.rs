//! Task queue operations over the shared task store
//!
//! This module handles:
//! - Idempotent enqueue keyed by URL hash
//! - Lease-based claiming of pending tasks
//! - Crash recovery by reclaiming expired leases
//! - Age-based requeue of finished tasks
//!
//! Every state change that depends on the current document goes through
//! `TaskStore::transact`, so the precondition is re-checked atomically with the
//! write.

use crate::clock::Clock;
use crate::state::TaskStatus;
use crate::storage::{
    StorageError, TaskQuery, TaskRecord, TaskStore, TaskTags, TaskUpdate, TimestampField,
};
use crate::url::{hash_normalized, normalize_url};
use crate::{CrawlError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default candidate oversampling for `claim`
pub const DEFAULT_CLAIM_OVERSAMPLE: u32 = 3;

/// Enqueues, claims and recycles tasks in a [`TaskStore`]
///
/// Any number of schedulers, in any number of processes, may operate on the
/// same store concurrently.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    oversample: u32,
}

impl TaskScheduler {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            oversample: DEFAULT_CLAIM_OVERSAMPLE,
        }
    }

    /// Sets how many candidates `claim` scans per requested task
    pub fn with_oversample(mut self, oversample: u32) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// Adds URLs to the queue
    ///
    /// Blank entries are ignored and unparseable ones are logged and skipped.
    /// Without `allow_duplicates`, a URL whose task is active (pending, running,
    /// downloaded or analyzed) is left alone; a finished one is reset to
    /// pending; an unknown one is created. With `allow_duplicates`, a new task
    /// is always inserted under a random key.
    ///
    /// # Returns
    ///
    /// The number of tasks created or reset.
    pub fn enqueue<I, S>(&self, urls: I, allow_duplicates: bool, tags: &TaskTags) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;

        for raw in urls {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }

            let normalized = match normalize_url(raw) {
                Ok(normalized) => normalized,
                Err(e) => {
                    warn!("Skipping unparseable URL {}: {}", raw, e);
                    continue;
                }
            };
            let hash = hash_normalized(&normalized);
            let now = self.clock.now();

            if allow_duplicates {
                let key = Uuid::new_v4().to_string();
                let task = TaskRecord::new_pending(key, raw, normalized, hash, tags.clone(), now);
                self.store.set(&task)?;
                count += 1;
                continue;
            }

            let written = self.store.transact(&hash, &mut |current| match current {
                Some(existing) if existing.status.is_active() => None,
                Some(existing) => {
                    let mut reset = existing.clone();
                    TaskUpdate {
                        requeued_at: Some(now),
                        ..TaskUpdate::to_status(TaskStatus::Pending)
                            .clear_lease()
                            .clear_errors()
                    }
                    .apply(&mut reset);
                    reset.tags = existing.tags.or_defaults(tags);
                    Some(reset)
                }
                None => Some(TaskRecord::new_pending(
                    hash.clone(),
                    raw,
                    normalized.clone(),
                    hash.clone(),
                    tags.clone(),
                    now,
                )),
            })?;

            if written.is_some() {
                count += 1;
            } else {
                debug!("Already queued: {}", normalized);
            }
        }

        Ok(count)
    }

    /// Leases up to `limit` pending tasks for `lease_seconds`
    ///
    /// Scans `limit * oversample` pending candidates and claims each inside a
    /// transaction that re-reads it first. A candidate another worker won, or
    /// that carries an unexpired lease, is skipped. Under contention this can
    /// return fewer than `limit` tasks even when more are pending.
    pub fn claim(&self, limit: usize, lease_seconds: u64) -> Result<Vec<TaskRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let scan = limit.saturating_mul(self.oversample as usize);
        let candidates = self
            .store
            .query(&TaskQuery::with_status(TaskStatus::Pending, scan))?;

        let lease = Duration::seconds(lease_seconds.min(i64::MAX as u64 / 1000) as i64);
        let mut claimed = Vec::with_capacity(limit);

        for candidate in candidates {
            if claimed.len() >= limit {
                break;
            }

            let now = self.clock.now();
            let written = self.store.transact(&candidate.key, &mut |current| {
                let task = current?;
                if task.status != TaskStatus::Pending {
                    return None;
                }
                if task.locked_until.map_or(false, |until| until > now) {
                    return None;
                }

                let mut leased = task.clone();
                leased.status = TaskStatus::Running;
                leased.locked_at = Some(now);
                leased.locked_until = Some(now + lease);
                Some(leased)
            })?;

            match written {
                Some(task) => claimed.push(task),
                None => debug!("Lost claim race for {}", candidate.key),
            }
        }

        info!("Claimed {} of {} requested tasks", claimed.len(), limit);
        Ok(claimed)
    }

    /// Returns running tasks whose lease expired before `now` to pending
    ///
    /// # Returns
    ///
    /// The number of tasks reclaimed, or 0 if the store cannot run the query.
    pub fn reclaim_expired_leases(&self, limit: usize, now: DateTime<Utc>) -> Result<usize> {
        let query = TaskQuery::with_status(TaskStatus::Running, limit)
            .older_than(TimestampField::LockedUntil, now);
        let candidates = self.scan("reclaim_expired_leases", &query)?;

        let mut reclaimed = 0;
        for candidate in candidates {
            let stamp = self.clock.now();
            let written = self.store.transact(&candidate.key, &mut |current| {
                let task = current.filter(|t| t.lease_expired(now))?;
                let mut reset = task.clone();
                TaskUpdate {
                    reclaimed_at: Some(stamp),
                    ..TaskUpdate::to_status(TaskStatus::Pending).clear_lease()
                }
                .apply(&mut reset);
                Some(reset)
            })?;
            if written.is_some() {
                reclaimed += 1;
            }
        }

        info!("Reclaimed {} expired leases", reclaimed);
        Ok(reclaimed)
    }

    /// Requeues downloaded or analyzed tasks finished before `older_than`
    ///
    /// Age is measured on `downloaded_at` or `analyzed_at` respectively.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - The number of tasks requeued (0 if the store cannot run the query)
    /// * `Err(CrawlError::InvalidTransition)` - For any other status
    pub fn requeue_stale_tasks(
        &self,
        status: TaskStatus,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize> {
        let field = match status {
            TaskStatus::Downloaded => TimestampField::DownloadedAt,
            TaskStatus::Analyzed => TimestampField::AnalyzedAt,
            other => {
                return Err(CrawlError::InvalidTransition {
                    from: other,
                    to: TaskStatus::Pending,
                })
            }
        };

        let query = TaskQuery::with_status(status, limit).older_than(field, older_than);
        let requeued = self.requeue_matching("requeue_stale_tasks", &query, false)?;
        info!("Requeued {} {} tasks", requeued, status);
        Ok(requeued)
    }

    /// Requeues error tasks that failed before `older_than`, clearing their errors
    ///
    /// # Returns
    ///
    /// The number of tasks requeued, or 0 if the store cannot run the query.
    pub fn requeue_error_tasks(&self, older_than: DateTime<Utc>, limit: usize) -> Result<usize> {
        let query = TaskQuery::with_status(TaskStatus::Error, limit)
            .older_than(TimestampField::FailedAt, older_than);
        let requeued = self.requeue_matching("requeue_error_tasks", &query, true)?;
        info!("Requeued {} error tasks", requeued);
        Ok(requeued)
    }

    fn requeue_matching(&self, op: &str, query: &TaskQuery, clear_errors: bool) -> Result<usize> {
        let candidates = self.scan(op, query)?;

        let mut requeued = 0;
        for candidate in candidates {
            let stamp = self.clock.now();
            let written = self.store.transact(&candidate.key, &mut |current| {
                let task = current.filter(|t| query.matches(t))?;
                let mut update = TaskUpdate {
                    requeued_at: Some(stamp),
                    ..TaskUpdate::to_status(TaskStatus::Pending).clear_lease()
                };
                if clear_errors {
                    update = update.clear_errors();
                }
                let mut reset = task.clone();
                update.apply(&mut reset);
                Some(reset)
            })?;
            if written.is_some() {
                requeued += 1;
            }
        }

        Ok(requeued)
    }

    /// Runs a maintenance query, degrading to no results if the store can't serve it
    fn scan(&self, op: &str, query: &TaskQuery) -> Result<Vec<TaskRecord>> {
        match self.store.query(query) {
            Ok(records) => Ok(records),
            Err(StorageError::QueryUnsupported(reason)) => {
                warn!("{} skipped, store cannot run query: {}", op, reason);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
