//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the TaskStore trait.
//! `transact` runs inside a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock before the read, so two connections (in this process or
//! another) can never both observe and act on the same precondition.

use crate::state::TaskStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, TaskStore, TransactFn};
use crate::storage::{TaskQuery, TaskRecord, TaskTags, TaskUpdate};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a connection waits on another writer before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const COLUMNS: &str = "key, url, normalized_url, url_hash, status, locked_at, locked_until, \
     fetch_attempts, response_status, block_signals, blocked_suspected, error_log, last_error, \
     skip_reason, title, storage_ref, fetch_latency_ms, brand, product, objective, created_at, \
     downloaded_at, analyzed_at, failed_at, skipped_at, requeued_at, reclaimed_at";

/// SQLite task store
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Opens or creates a task database on disk
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteTaskStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

impl TaskStore for SqliteTaskStore {
    // ===== Document Access =====

    fn get(&self, key: &str) -> StorageResult<Option<TaskRecord>> {
        let conn = self.lock()?;
        select_one(&conn, key)
    }

    fn set(&self, record: &TaskRecord) -> StorageResult<()> {
        let conn = self.lock()?;
        write_record(&conn, record)
    }

    fn update(&self, key: &str, update: &TaskUpdate) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record =
            select_one(&tx, key)?.ok_or_else(|| StorageError::TaskNotFound(key.to_string()))?;
        update.apply(&mut record);
        write_record(&tx, &record)?;

        tx.commit()?;
        Ok(())
    }

    // ===== Queries =====

    fn query(&self, query: &TaskQuery) -> StorageResult<Vec<TaskRecord>> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {} FROM tasks WHERE 1 = 1", COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(status.to_db_string().to_string()));
        }
        if let Some((field, instant)) = query.before {
            sql.push_str(&format!(" AND {} < ?", field.column()));
            values.push(Value::Text(format_timestamp(&instant)));
        }
        sql.push_str(" ORDER BY created_at, key LIMIT ?");
        values.push(Value::Integer(query.limit.min(i64::MAX as usize) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Transactions =====

    fn transact(&self, key: &str, f: &mut TransactFn<'_>) -> StorageResult<Option<TaskRecord>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = select_one(&tx, key)?;
        let next = f(current.as_ref());

        if let Some(record) = &next {
            if record.key != key {
                return Err(StorageError::Database(format!(
                    "transaction on {} attempted to write {}",
                    key, record.key
                )));
            }
            write_record(&tx, record)?;
        }

        tx.commit()?;
        Ok(next)
    }
}

fn select_one(conn: &Connection, key: &str) -> StorageResult<Option<TaskRecord>> {
    let sql = format!("SELECT {} FROM tasks WHERE key = ?1", COLUMNS);
    let record = conn
        .query_row(&sql, params![key], row_to_record)
        .optional()?;
    Ok(record)
}

fn write_record(conn: &Connection, record: &TaskRecord) -> StorageResult<()> {
    let signals = serde_json::to_string(&record.block_signals)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO tasks ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
              ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
            COLUMNS
        ),
        params![
            record.key,
            record.url,
            record.normalized_url,
            record.url_hash,
            record.status.to_db_string(),
            record.locked_at.as_ref().map(format_timestamp),
            record.locked_until.as_ref().map(format_timestamp),
            record.fetch_attempts,
            record.response_status,
            signals,
            record.blocked_suspected,
            record.error_log,
            record.last_error,
            record.skip_reason,
            record.title,
            record.storage_ref,
            record.fetch_latency_ms.map(|ms| ms.min(i64::MAX as u64) as i64),
            record.tags.brand,
            record.tags.product,
            record.tags.objective,
            format_timestamp(&record.created_at),
            record.downloaded_at.as_ref().map(format_timestamp),
            record.analyzed_at.as_ref().map(format_timestamp),
            record.failed_at.as_ref().map(format_timestamp),
            record.skipped_at.as_ref().map(format_timestamp),
            record.requeued_at.as_ref().map(format_timestamp),
            record.reclaimed_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_str: String = row.get(4)?;
    let status = TaskStatus::from_db_string(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown task status: {}", status_str).into(),
        )
    })?;

    let signals_json: String = row.get(9)?;
    let block_signals: Vec<String> = serde_json::from_str(&signals_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(TaskRecord {
        key: row.get(0)?,
        url: row.get(1)?,
        normalized_url: row.get(2)?,
        url_hash: row.get(3)?,
        status,
        locked_at: optional_timestamp(row, 5)?,
        locked_until: optional_timestamp(row, 6)?,
        fetch_attempts: row.get(7)?,
        response_status: row.get(8)?,
        block_signals,
        blocked_suspected: row.get(10)?,
        error_log: row.get(11)?,
        last_error: row.get(12)?,
        skip_reason: row.get(13)?,
        title: row.get(14)?,
        storage_ref: row.get(15)?,
        fetch_latency_ms: row.get::<_, Option<i64>>(16)?.map(|ms| ms.max(0) as u64),
        tags: TaskTags {
            brand: row.get(17)?,
            product: row.get(18)?,
            objective: row.get(19)?,
        },
        created_at: parse_timestamp(20, &row.get::<_, String>(20)?)?,
        downloaded_at: optional_timestamp(row, 21)?,
        analyzed_at: optional_timestamp(row, 22)?,
        failed_at: optional_timestamp(row, 23)?,
        skipped_at: optional_timestamp(row, 24)?,
        requeued_at: optional_timestamp(row, 25)?,
        reclaimed_at: optional_timestamp(row, 26)?,
    })
}

/// Fixed-width RFC 3339 in UTC, so text comparison orders like time
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_timestamp(idx, &s))
        .transpose()
}
