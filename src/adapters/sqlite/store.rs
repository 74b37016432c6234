//! SQLite implementation of the sync store
//!
//! One connection behind a mutex. Every call runs on the blocking thread pool
//! so store access never stalls a loop's timer.

use crate::adapters::database::traits::{DeliveryLog, IngestionStore, JobQueue, SyncStore};
use crate::adapters::sqlite::schema::init_schema;
use crate::core::hashing::content_hash;
use crate::core::retry::{RetryDecision, RetryPolicy};
use crate::domain::{
    ClaimedJob, DeliveryLogEntry, ErpSyncError, Job, JobId, JobStatus, NaturalKey, QueueDepth,
    RawRecord, RecordId, Result, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = "id, record_id, status, retry_count, last_error, last_attempt_at, \
                           next_attempt_at, created_at, updated_at";

/// SQLite-backed ingestion store, job queue and delivery log
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteStore {
    /// Opens or creates the database file and its schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ErpSyncError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            ErpSyncError::Database(format!(
                "Failed to open SQLite database {}: {}",
                path.display(),
                e
            ))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.display().to_string(),
        })
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| {
                ErpSyncError::Database(format!("Failed to acquire database lock: {}", e))
            })?;
            f(&mut guard)
        })
        .await?
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| ErpSyncError::Database(format!("Timestamp out of range: {ms}")))
}

fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

/// Column values of a `sync_jobs` row before domain conversion
struct JobRow {
    id: i64,
    record_id: i64,
    status: String,
    retry_count: i64,
    last_error: Option<String>,
    last_attempt_at: Option<i64>,
    next_attempt_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            record_id: row.get(1)?,
            status: row.get(2)?,
            retry_count: row.get(3)?,
            last_error: row.get(4)?,
            last_attempt_at: row.get(5)?,
            next_attempt_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId::new(self.id),
            record_id: RecordId::new(self.record_id),
            status: JobStatus::from_str(&self.status).map_err(ErpSyncError::Database)?,
            retry_count: u32::try_from(self.retry_count).map_err(|_| {
                ErpSyncError::Database(format!("Invalid retry_count {}", self.retry_count))
            })?,
            last_error: self.last_error,
            last_attempt_at: from_millis_opt(self.last_attempt_at)?,
            next_attempt_at: from_millis_opt(self.next_attempt_at)?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn load_job(conn: &Connection, job_id: i64) -> Result<Option<Job>> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1");
    conn.query_row(&sql, params![job_id], JobRow::from_row)
        .optional()?
        .map(JobRow::into_job)
        .transpose()
}

fn load_record(conn: &Connection, record_id: i64) -> Result<Option<RawRecord>> {
    let row = conn
        .query_row(
            "SELECT id, natural_key, payload, content_hash, fetched_at \
             FROM raw_records WHERE id = ?1",
            params![record_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, key, payload, hash, fetched_at)) = row else {
        return Ok(None);
    };

    Ok(Some(RawRecord {
        id: RecordId::new(id),
        natural_key: NaturalKey::new(key).map_err(ErpSyncError::Database)?,
        payload: serde_json::from_str(&payload)?,
        content_hash: hash,
        fetched_at: from_millis(fetched_at)?,
    }))
}

fn job_state_error(conn: &Connection, job_id: i64, expected: JobStatus) -> Result<ErpSyncError> {
    let current = load_job(conn, job_id)?;
    Ok(match current {
        Some(job) => ErpSyncError::JobState(format!(
            "job {} is {}, expected {}",
            job_id, job.status, expected
        )),
        None => ErpSyncError::JobState(format!("job {} does not exist", job_id)),
    })
}

#[async_trait]
impl IngestionStore for SqliteStore {
    async fn upsert_record(
        &self,
        key: &NaturalKey,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let hash = content_hash(payload)?;
        let payload_text = serde_json::to_string(payload)?;
        let key = key.as_str().to_string();
        let now = to_millis(now);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let existing = tx
                .query_row(
                    "SELECT id, content_hash FROM raw_records WHERE natural_key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let outcome = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO raw_records (natural_key, payload, content_hash, fetched_at) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![key, payload_text, hash, now],
                    )?;
                    UpsertOutcome {
                        record_id: RecordId::new(tx.last_insert_rowid()),
                        changed: false,
                    }
                }
                Some((id, existing_hash)) if existing_hash != hash => {
                    tx.execute(
                        "UPDATE raw_records SET payload = ?2, content_hash = ?3, fetched_at = ?4 \
                         WHERE id = ?1",
                        params![id, payload_text, hash, now],
                    )?;
                    UpsertOutcome {
                        record_id: RecordId::new(id),
                        changed: true,
                    }
                }
                Some((id, _)) => UpsertOutcome {
                    record_id: RecordId::new(id),
                    changed: false,
                },
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<RawRecord>> {
        self.with_conn(move |conn| load_record(conn, id.value()))
            .await
    }
}

#[async_trait]
impl JobQueue for SqliteStore {
    async fn enqueue(
        &self,
        record_id: RecordId,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<JobId>> {
        let now = to_millis(now);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO sync_jobs (record_id, status, retry_count, next_attempt_at, created_at, updated_at) \
                 VALUES (?1, 'queued', 0, ?2, ?2, ?2) \
                 ON CONFLICT(record_id) DO NOTHING",
                params![record_id.value(), now],
            )?;

            let job_id = if inserted == 1 {
                Some(JobId::new(tx.last_insert_rowid()))
            } else {
                tx.query_row(
                    "UPDATE sync_jobs \
                     SET status = 'queued', retry_count = 0, last_error = NULL, \
                         next_attempt_at = ?2, updated_at = ?2 \
                     WHERE record_id = ?1 AND status = 'done' \
                       AND (?3 OR last_attempt_at < \
                            (SELECT fetched_at FROM raw_records WHERE raw_records.id = sync_jobs.record_id)) \
                     RETURNING id",
                    params![record_id.value(), now, force],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .map(JobId::new)
            };

            tx.commit()?;
            Ok(job_id)
        })
        .await
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>> {
        let now = to_millis(now);

        self.with_conn(move |conn| loop {
            let candidate = conn
                .query_row(
                    "SELECT id FROM sync_jobs \
                     WHERE status = 'queued' AND (next_attempt_at IS NULL OR next_attempt_at <= ?1) \
                     ORDER BY created_at, id \
                     LIMIT 1",
                    params![now],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;

            let Some(job_id) = candidate else {
                return Ok(None);
            };

            let claimed = conn.execute(
                "UPDATE sync_jobs \
                 SET status = 'processing', last_attempt_at = ?2, updated_at = ?2 \
                 WHERE id = ?1 AND status = 'queued'",
                params![job_id, now],
            )?;

            if claimed == 0 {
                // Another writer won this row
                continue;
            }

            let job = load_job(conn, job_id)?.ok_or_else(|| {
                ErpSyncError::Database(format!("claimed job {job_id} disappeared"))
            })?;
            let record = load_record(conn, job.record_id.value())?.ok_or_else(|| {
                ErpSyncError::Database(format!(
                    "job {} references missing record {}",
                    job_id, job.record_id
                ))
            })?;

            return Ok(Some(ClaimedJob { job, record }));
        })
        .await
    }

    async fn complete(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let now = to_millis(now);

        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE sync_jobs SET status = 'done', next_attempt_at = NULL, updated_at = ?2 \
                 WHERE id = ?1 AND status = 'processing'",
                params![job_id.value(), now],
            )?;

            if updated == 0 {
                return Err(job_state_error(conn, job_id.value(), JobStatus::Processing)?);
            }
            Ok(())
        })
        .await
    }

    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<JobStatus> {
        let error = error.to_string();
        let policy = *policy;

        self.with_conn(move |conn| {
            let current = conn
                .query_row(
                    "SELECT status, retry_count FROM sync_jobs WHERE id = ?1",
                    params![job_id.value()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            let retry_count = match current {
                Some((status, retry_count)) if status == JobStatus::Processing.as_str() => {
                    retry_count
                }
                _ => return Err(job_state_error(conn, job_id.value(), JobStatus::Processing)?),
            };

            let failures = u32::try_from(retry_count + 1).unwrap_or(u32::MAX);
            let (status, next_attempt_at) = match policy.next_after_failure(failures) {
                RetryDecision::Retry { delay } => {
                    (JobStatus::Queued, Some(to_millis(now + delay)))
                }
                RetryDecision::Exhausted => (JobStatus::Failed, None),
            };

            let updated = conn.execute(
                "UPDATE sync_jobs \
                 SET status = ?3, retry_count = ?4, last_error = ?5, \
                     next_attempt_at = ?6, updated_at = ?7 \
                 WHERE id = ?1 AND status = 'processing' AND retry_count = ?2",
                params![
                    job_id.value(),
                    retry_count,
                    status.as_str(),
                    retry_count + 1,
                    error,
                    next_attempt_at,
                    to_millis(now),
                ],
            )?;

            if updated == 0 {
                return Err(ErpSyncError::JobState(format!(
                    "job {} changed while recording its failure",
                    job_id
                )));
            }
            Ok(status)
        })
        .await
    }

    async fn reap_stuck(&self, timeout: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = to_millis(now - timeout);
        let now = to_millis(now);

        self.with_conn(move |conn| {
            let reaped = conn.execute(
                "UPDATE sync_jobs SET status = 'queued', updated_at = ?2 \
                 WHERE status = 'processing' AND last_attempt_at < ?1",
                params![cutoff, now],
            )?;
            Ok(reaped as u64)
        })
        .await
    }

    async fn requeue_failed(&self, job_id: Option<JobId>, now: DateTime<Utc>) -> Result<u64> {
        let now = to_millis(now);

        self.with_conn(move |conn| {
            let requeued = match job_id {
                Some(id) => conn.execute(
                    "UPDATE sync_jobs \
                     SET status = 'queued', retry_count = 0, next_attempt_at = ?2, updated_at = ?2 \
                     WHERE id = ?1 AND status = 'failed'",
                    params![id.value(), now],
                )?,
                None => conn.execute(
                    "UPDATE sync_jobs \
                     SET status = 'queued', retry_count = 0, next_attempt_at = ?1, updated_at = ?1 \
                     WHERE status = 'failed'",
                    params![now],
                )?,
            };
            Ok(requeued as u64)
        })
        .await
    }

    async fn queue_depth(&self) -> Result<QueueDepth> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM sync_jobs GROUP BY status")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut depth = QueueDepth::default();
            for (status, count) in rows {
                let status = JobStatus::from_str(&status).map_err(ErpSyncError::Database)?;
                depth.set(status, count.max(0) as u64);
            }
            Ok(depth)
        })
        .await
    }

    async fn list_jobs(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = ?1 \
                 ORDER BY updated_at DESC, id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status.as_str(), limit as i64], JobRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>> {
        self.with_conn(move |conn| load_job(conn, job_id.value()))
            .await
    }

    async fn job_for_record(&self, record_id: RecordId) -> Result<Option<Job>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE record_id = ?1");
            conn.query_row(&sql, params![record_id.value()], JobRow::from_row)
                .optional()?
                .map(JobRow::into_job)
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl DeliveryLog for SqliteStore {
    async fn log_delivery(&self, entry: &DeliveryLogEntry) -> Result<()> {
        let entry = entry.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO delivery_log (job_id, response_code, response_body, sent_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.job_id.value(),
                    entry.response_code,
                    entry.response_body,
                    to_millis(entry.sent_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn deliveries_for_job(&self, job_id: JobId) -> Result<Vec<DeliveryLogEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, response_code, response_body, sent_at \
                 FROM delivery_log WHERE job_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![job_id.value()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(job_id, code, body, sent_at)| {
                    Ok(DeliveryLogEntry {
                        job_id: JobId::new(job_id),
                        response_code: code,
                        response_body: body,
                        sent_at: from_millis(sent_at)?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn test_connection(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await?;

        tracing::debug!(location = %self.location, "SQLite connection test successful");
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.with_conn(|conn| init_schema(conn)).await
    }
}
