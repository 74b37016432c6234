//! SQLite schema for the sync tables
//!
//! Timestamps are UTC epoch milliseconds.

use crate::domain::Result;
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    natural_key TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,              -- JSON
    content_hash TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_records_content_hash ON raw_records(content_hash);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL UNIQUE REFERENCES raw_records(id),
    status TEXT NOT NULL CHECK (status IN ('queued', 'processing', 'done', 'failed')),
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    last_attempt_at INTEGER,
    next_attempt_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_next_attempt ON sync_jobs(status, next_attempt_at);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_last_attempt ON sync_jobs(status, last_attempt_at);

CREATE TABLE IF NOT EXISTS delivery_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES sync_jobs(id),
    response_code INTEGER NOT NULL,
    response_body TEXT NOT NULL,
    sent_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_delivery_log_job_id ON delivery_log(job_id);
"#;

/// Creates the sync tables and indexes if they do not exist
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
