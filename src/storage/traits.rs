//! Storage traits and error types
//!
//! This module defines the task store contract the scheduler and the
//! orchestrator are written against, and the associated error types.

use crate::storage::{TaskQuery, TaskRecord, TaskUpdate};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The store cannot serve a query shape (missing index or equivalent)
    #[error("Query not supported by store: {0}")]
    QueryUnsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Closure run inside [`TaskStore::transact`]
///
/// Receives the current document (None if absent) and returns the document to
/// write, or None to leave the store untouched.
pub type TransactFn<'a> = dyn FnMut(Option<&TaskRecord>) -> Option<TaskRecord> + 'a;

/// A document collection of tasks keyed by a string key
///
/// Implementations must be safe to share between workers. The only strong
/// consistency requirement is on [`transact`](TaskStore::transact): the read
/// and the conditional write it performs must be atomic with respect to every
/// other writer of the same key, including writers in other processes.
pub trait TaskStore: Send + Sync {
    // ===== Document Access =====

    /// Gets a task by key
    fn get(&self, key: &str) -> StorageResult<Option<TaskRecord>>;

    /// Writes a full task document, replacing any existing one
    fn set(&self, record: &TaskRecord) -> StorageResult<()>;

    /// Applies a field patch to an existing task
    ///
    /// # Returns
    ///
    /// * `Err(StorageError::TaskNotFound)` - If no task exists under `key`
    fn update(&self, key: &str, update: &TaskUpdate) -> StorageResult<()>;

    // ===== Queries =====

    /// Returns tasks matching the query's equality and range filters
    ///
    /// Results are ordered by `created_at` and capped at `query.limit`.
    fn query(&self, query: &TaskQuery) -> StorageResult<Vec<TaskRecord>>;

    // ===== Transactions =====

    /// Atomically reads one document and conditionally writes it
    ///
    /// # Arguments
    ///
    /// * `key` - The document key
    /// * `f` - Decides the new document from the current one
    ///
    /// # Returns
    ///
    /// The written document, or None if `f` declined to write.
    fn transact(&self, key: &str, f: &mut TransactFn<'_>) -> StorageResult<Option<TaskRecord>>;
}
