//! Storage module for persisting crawl tasks
//!
//! This module handles all persistence for the crawler, including:
//! - The task store contract and its SQLite implementation
//! - Task documents, field patches and queries
//! - Fetched content persistence

mod content;
mod schema;
mod sqlite;
mod traits;

pub use content::{gzip_bytes, ContentStore, LocalContentStore};
pub use sqlite::SqliteTaskStore;
pub use traits::{StorageError, StorageResult, TaskStore, TransactFn};

use crate::state::TaskStatus;
use chrono::{DateTime, Utc};

/// Pass-through context tags attached to a task at enqueue time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTags {
    pub brand: Option<String>,
    pub product: Option<String>,
    pub objective: Option<String>,
}

impl TaskTags {
    /// Fills any blank tag from `defaults`
    pub fn or_defaults(&self, defaults: &TaskTags) -> TaskTags {
        TaskTags {
            brand: self.brand.clone().or_else(|| defaults.brand.clone()),
            product: self.product.clone().or_else(|| defaults.product.clone()),
            objective: self.objective.clone().or_else(|| defaults.objective.clone()),
        }
    }
}

/// Represents a task document in the store
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// Document key: the `url_hash`, or a random id for forced duplicates
    pub key: String,
    pub url: String,
    pub normalized_url: String,
    pub url_hash: String,
    pub status: TaskStatus,

    // Lease
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,

    // Fetch outcome
    pub fetch_attempts: u32,
    pub response_status: Option<u16>,
    pub block_signals: Vec<String>,
    pub blocked_suspected: bool,
    pub error_log: Option<String>,
    pub last_error: Option<String>,
    pub skip_reason: Option<String>,
    pub title: Option<String>,
    pub storage_ref: Option<String>,
    pub fetch_latency_ms: Option<u64>,

    pub tags: TaskTags,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub requeued_at: Option<DateTime<Utc>>,
    pub reclaimed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Creates a fresh pending task
    pub fn new_pending(
        key: impl Into<String>,
        url: impl Into<String>,
        normalized_url: impl Into<String>,
        url_hash: impl Into<String>,
        tags: TaskTags,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            normalized_url: normalized_url.into(),
            url_hash: url_hash.into(),
            status: TaskStatus::Pending,
            locked_at: None,
            locked_until: None,
            fetch_attempts: 0,
            response_status: None,
            block_signals: Vec::new(),
            blocked_suspected: false,
            error_log: None,
            last_error: None,
            skip_reason: None,
            title: None,
            storage_ref: None,
            fetch_latency_ms: None,
            tags,
            created_at: now,
            downloaded_at: None,
            analyzed_at: None,
            failed_at: None,
            skipped_at: None,
            requeued_at: None,
            reclaimed_at: None,
        }
    }

    /// Returns true if this task is still running under the lease ending at `lease`
    ///
    /// A reclaimed or re-claimed task no longer matches the lease its earlier
    /// holder was granted.
    pub fn is_held_under(&self, lease: Option<DateTime<Utc>>) -> bool {
        self.status == TaskStatus::Running && lease.is_some() && self.locked_until == lease
    }

    /// Returns true if this task is running under a lease that has expired
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running && self.locked_until.map_or(false, |t| t < now)
    }
}

/// A partial update to a task document
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears the
/// field and `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub locked_at: Option<Option<DateTime<Utc>>>,
    pub locked_until: Option<Option<DateTime<Utc>>>,
    pub fetch_attempts: Option<u32>,
    pub response_status: Option<Option<u16>>,
    pub block_signals: Option<Vec<String>>,
    pub blocked_suspected: Option<bool>,
    pub error_log: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
    pub skip_reason: Option<Option<String>>,
    pub title: Option<Option<String>>,
    pub storage_ref: Option<Option<String>>,
    pub fetch_latency_ms: Option<Option<u64>>,
    pub tags: Option<TaskTags>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub requeued_at: Option<DateTime<Utc>>,
    pub reclaimed_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    /// Starts an update that moves the task to `status`
    pub fn to_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Clears both lease bounds
    pub fn clear_lease(mut self) -> Self {
        self.locked_at = Some(None);
        self.locked_until = Some(None);
        self
    }

    /// Clears the recorded error fields
    pub fn clear_errors(mut self) -> Self {
        self.error_log = Some(None);
        self.last_error = Some(None);
        self
    }

    /// Applies this patch to a task document
    pub fn apply(&self, record: &mut TaskRecord) {
        fn patch<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        fn stamp(slot: &mut Option<DateTime<Utc>>, value: &Option<DateTime<Utc>>) {
            if value.is_some() {
                *slot = *value;
            }
        }

        patch(&mut record.status, &self.status);
        patch(&mut record.locked_at, &self.locked_at);
        patch(&mut record.locked_until, &self.locked_until);
        patch(&mut record.fetch_attempts, &self.fetch_attempts);
        patch(&mut record.response_status, &self.response_status);
        patch(&mut record.block_signals, &self.block_signals);
        patch(&mut record.blocked_suspected, &self.blocked_suspected);
        patch(&mut record.error_log, &self.error_log);
        patch(&mut record.last_error, &self.last_error);
        patch(&mut record.skip_reason, &self.skip_reason);
        patch(&mut record.title, &self.title);
        patch(&mut record.storage_ref, &self.storage_ref);
        patch(&mut record.fetch_latency_ms, &self.fetch_latency_ms);
        patch(&mut record.tags, &self.tags);
        stamp(&mut record.downloaded_at, &self.downloaded_at);
        stamp(&mut record.failed_at, &self.failed_at);
        stamp(&mut record.skipped_at, &self.skipped_at);
        stamp(&mut record.requeued_at, &self.requeued_at);
        stamp(&mut record.reclaimed_at, &self.reclaimed_at);
    }
}

/// Timestamp fields usable as a range filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    CreatedAt,
    LockedUntil,
    DownloadedAt,
    AnalyzedAt,
    FailedAt,
}

impl TimestampField {
    /// Column name in the tasks table
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::LockedUntil => "locked_until",
            Self::DownloadedAt => "downloaded_at",
            Self::AnalyzedAt => "analyzed_at",
            Self::FailedAt => "failed_at",
        }
    }

    /// Reads this field from a task document
    pub fn value_of(&self, record: &TaskRecord) -> Option<DateTime<Utc>> {
        match self {
            Self::CreatedAt => Some(record.created_at),
            Self::LockedUntil => record.locked_until,
            Self::DownloadedAt => record.downloaded_at,
            Self::AnalyzedAt => record.analyzed_at,
            Self::FailedAt => record.failed_at,
        }
    }
}

/// An equality filter on status plus an optional `field < instant` range filter
#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub before: Option<(TimestampField, DateTime<Utc>)>,
    pub limit: usize,
}

impl TaskQuery {
    /// Matches tasks in `status`, up to `limit`
    pub fn with_status(status: TaskStatus, limit: usize) -> Self {
        Self {
            status: Some(status),
            before: None,
            limit,
        }
    }

    /// Additionally requires `field < instant`
    pub fn older_than(mut self, field: TimestampField, instant: DateTime<Utc>) -> Self {
        self.before = Some((field, instant));
        self
    }

    /// Returns true if `record` satisfies every filter
    pub fn matches(&self, record: &TaskRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some((field, instant)) = self.before {
            match field.value_of(record) {
                Some(value) if value < instant => {}
                _ => return false,
            }
        }
        true
    }
}
