//! Database schema definitions
//!
//! This module contains the SQL schema for the task queue database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One document per task
CREATE TABLE IF NOT EXISTS tasks (
    key TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    locked_at TEXT,
    locked_until TEXT,
    fetch_attempts INTEGER NOT NULL DEFAULT 0,
    response_status INTEGER,
    block_signals TEXT NOT NULL DEFAULT '[]',
    blocked_suspected INTEGER NOT NULL DEFAULT 0,
    error_log TEXT,
    last_error TEXT,
    skip_reason TEXT,
    title TEXT,
    storage_ref TEXT,
    fetch_latency_ms INTEGER,
    brand TEXT,
    product TEXT,
    objective TEXT,
    created_at TEXT NOT NULL,
    downloaded_at TEXT,
    analyzed_at TEXT,
    failed_at TEXT,
    skipped_at TEXT,
    requeued_at TEXT,
    reclaimed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks(status, created_at);
CREATE INDEX IF NOT EXISTS idx_tasks_status_locked_until ON tasks(status, locked_until);
CREATE INDEX IF NOT EXISTS idx_tasks_url_hash ON tasks(url_hash);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
