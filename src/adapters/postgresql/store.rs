//! PostgreSQL implementation of the sync store
//!
//! Claims use `FOR UPDATE SKIP LOCKED` inside the conditional update so
//! several workers can drain one queue.

use crate::adapters::database::traits::{DeliveryLog, IngestionStore, JobQueue, SyncStore};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::core::hashing::content_hash;
use crate::core::retry::{RetryDecision, RetryPolicy};
use crate::domain::{
    ClaimedJob, DeliveryLogEntry, ErpSyncError, Job, JobId, JobStatus, NaturalKey, QueueDepth,
    RawRecord, RecordId, Result, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::Row;

const JOB_COLUMNS: &str = "id, record_id, status, retry_count, last_error, last_attempt_at, \
                           next_attempt_at, created_at, updated_at";

/// PostgreSQL-backed ingestion store, job queue and delivery log
pub struct PostgreSQLStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLStore {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

fn job_from_row(row: &Row) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let retry_count: i32 = row.try_get("retry_count")?;

    Ok(Job {
        id: JobId::new(row.try_get("id")?),
        record_id: RecordId::new(row.try_get("record_id")?),
        status: JobStatus::from_str(&status).map_err(ErpSyncError::Database)?,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| ErpSyncError::Database(format!("Invalid retry_count {retry_count}")))?,
        last_error: row.try_get("last_error")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &Row) -> Result<RawRecord> {
    let key: String = row.try_get("natural_key")?;

    Ok(RawRecord {
        id: RecordId::new(row.try_get("id")?),
        natural_key: NaturalKey::new(key).map_err(ErpSyncError::Database)?,
        payload: row.try_get("payload")?,
        content_hash: row.try_get("content_hash")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

#[async_trait]
impl IngestionStore for PostgreSQLStore {
    async fn upsert_record(
        &self,
        key: &NaturalKey,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let hash = content_hash(payload)?;
        let conn = self.client.get_connection().await?;

        // xmax = 0 only for freshly inserted tuples
        let written = conn
            .query_opt(
                "INSERT INTO raw_records (natural_key, payload, content_hash, fetched_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (natural_key) DO UPDATE \
                 SET payload = EXCLUDED.payload, content_hash = EXCLUDED.content_hash, \
                     fetched_at = EXCLUDED.fetched_at \
                 WHERE raw_records.content_hash <> EXCLUDED.content_hash \
                 RETURNING id, (xmax = 0) AS inserted",
                &[&key.as_str(), payload, &hash, &now],
            )
            .await?;

        if let Some(row) = written {
            let inserted: bool = row.try_get("inserted")?;
            return Ok(UpsertOutcome {
                record_id: RecordId::new(row.try_get("id")?),
                changed: !inserted,
            });
        }

        let row = conn
            .query_one(
                "SELECT id FROM raw_records WHERE natural_key = $1",
                &[&key.as_str()],
            )
            .await?;
        Ok(UpsertOutcome {
            record_id: RecordId::new(row.try_get("id")?),
            changed: false,
        })
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<RawRecord>> {
        let conn = self.client.get_connection().await?;
        conn.query_opt(
            "SELECT id, natural_key, payload, content_hash, fetched_at \
             FROM raw_records WHERE id = $1",
            &[&id.value()],
        )
        .await?
        .as_ref()
        .map(record_from_row)
        .transpose()
    }
}

#[async_trait]
impl JobQueue for PostgreSQLStore {
    async fn enqueue(
        &self,
        record_id: RecordId,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<JobId>> {
        let conn = self.client.get_connection().await?;

        let created = conn
            .query_opt(
                "INSERT INTO sync_jobs (record_id, status, retry_count, next_attempt_at, created_at, updated_at) \
                 VALUES ($1, 'queued', 0, $2, $2, $2) \
                 ON CONFLICT (record_id) DO NOTHING \
                 RETURNING id",
                &[&record_id.value(), &now],
            )
            .await?;

        if let Some(row) = created {
            return Ok(Some(JobId::new(row.try_get("id")?)));
        }

        let reopened = conn
            .query_opt(
                "UPDATE sync_jobs \
                 SET status = 'queued', retry_count = 0, last_error = NULL, \
                     next_attempt_at = $2, updated_at = $2 \
                 WHERE record_id = $1 AND status = 'done' \
                   AND ($3 OR last_attempt_at < \
                        (SELECT fetched_at FROM raw_records WHERE raw_records.id = sync_jobs.record_id)) \
                 RETURNING id",
                &[&record_id.value(), &now, &force],
            )
            .await?;

        reopened
            .map(|row| row.try_get("id").map(JobId::new))
            .transpose()
            .map_err(ErpSyncError::from)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>> {
        let conn = self.client.get_connection().await?;

        let sql = format!(
            "UPDATE sync_jobs \
             SET status = 'processing', last_attempt_at = $1, updated_at = $1 \
             WHERE id = ( \
                 SELECT id FROM sync_jobs \
                 WHERE status = 'queued' AND (next_attempt_at IS NULL OR next_attempt_at <= $1) \
                 ORDER BY created_at, id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) AND status = 'queued' \
             RETURNING {JOB_COLUMNS}"
        );

        let Some(row) = conn.query_opt(&sql, &[&now]).await? else {
            return Ok(None);
        };
        let job = job_from_row(&row)?;

        let record_row = conn
            .query_opt(
                "SELECT id, natural_key, payload, content_hash, fetched_at \
                 FROM raw_records WHERE id = $1",
                &[&job.record_id.value()],
            )
            .await?
            .ok_or_else(|| {
                ErpSyncError::Database(format!(
                    "job {} references missing record {}",
                    job.id, job.record_id
                ))
            })?;

        Ok(Some(ClaimedJob {
            record: record_from_row(&record_row)?,
            job,
        }))
    }

    async fn complete(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()> {
        let conn = self.client.get_connection().await?;

        let updated = conn
            .execute(
                "UPDATE sync_jobs SET status = 'done', next_attempt_at = NULL, updated_at = $2 \
                 WHERE id = $1 AND status = 'processing'",
                &[&job_id.value(), &now],
            )
            .await?;

        if updated == 0 {
            let current = self.get_job(job_id).await?;
            return Err(ErpSyncError::JobState(match current {
                Some(job) => format!("job {} is {}, expected processing", job_id, job.status),
                None => format!("job {} does not exist", job_id),
            }));
        }
        Ok(())
    }

    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<JobStatus> {
        let conn = self.client.get_connection().await?;

        let current = conn
            .query_opt(
                "SELECT status, retry_count FROM sync_jobs WHERE id = $1",
                &[&job_id.value()],
            )
            .await?;

        let retry_count: i32 = match current {
            Some(row) => {
                let status: String = row.try_get("status")?;
                if status != JobStatus::Processing.as_str() {
                    return Err(ErpSyncError::JobState(format!(
                        "job {} is {}, expected processing",
                        job_id, status
                    )));
                }
                row.try_get("retry_count")?
            }
            None => {
                return Err(ErpSyncError::JobState(format!(
                    "job {} does not exist",
                    job_id
                )))
            }
        };

        let failures = u32::try_from(retry_count + 1).unwrap_or(u32::MAX);
        let (status, next_attempt_at) = match policy.next_after_failure(failures) {
            RetryDecision::Retry { delay } => (JobStatus::Queued, Some(now + delay)),
            RetryDecision::Exhausted => (JobStatus::Failed, None),
        };

        let updated = conn
            .execute(
                "UPDATE sync_jobs \
                 SET status = $3, retry_count = $4, last_error = $5, \
                     next_attempt_at = $6, updated_at = $7 \
                 WHERE id = $1 AND status = 'processing' AND retry_count = $2",
                &[
                    &job_id.value(),
                    &retry_count,
                    &status.as_str(),
                    &(retry_count + 1),
                    &error,
                    &next_attempt_at,
                    &now,
                ],
            )
            .await?;

        if updated == 0 {
            return Err(ErpSyncError::JobState(format!(
                "job {} changed while recording its failure",
                job_id
            )));
        }
        Ok(status)
    }

    async fn reap_stuck(&self, timeout: Duration, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.client.get_connection().await?;
        let cutoff = now - timeout;

        let reaped = conn
            .execute(
                "UPDATE sync_jobs SET status = 'queued', updated_at = $2 \
                 WHERE status = 'processing' AND last_attempt_at < $1",
                &[&cutoff, &now],
            )
            .await?;
        Ok(reaped)
    }

    async fn requeue_failed(&self, job_id: Option<JobId>, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.client.get_connection().await?;
        let job_id = job_id.map(|id| id.value());

        let requeued = conn
            .execute(
                "UPDATE sync_jobs \
                 SET status = 'queued', retry_count = 0, next_attempt_at = $2, updated_at = $2 \
                 WHERE status = 'failed' AND ($1::BIGINT IS NULL OR id = $1)",
                &[&job_id, &now],
            )
            .await?;
        Ok(requeued)
    }

    async fn queue_depth(&self) -> Result<QueueDepth> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(
                "SELECT status, COUNT(*) AS count FROM sync_jobs GROUP BY status",
                &[],
            )
            .await?;

        let mut depth = QueueDepth::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let status = JobStatus::from_str(&status).map_err(ErpSyncError::Database)?;
            depth.set(status, count.max(0) as u64);
        }
        Ok(depth)
    }

    async fn list_jobs(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        let conn = self.client.get_connection().await?;
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = $1 \
             ORDER BY updated_at DESC, id DESC LIMIT $2"
        );
        let rows = conn
            .query(&sql, &[&status.as_str(), &(limit as i64)])
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>> {
        let conn = self.client.get_connection().await?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = $1");
        conn.query_opt(&sql, &[&job_id.value()])
            .await?
            .as_ref()
            .map(job_from_row)
            .transpose()
    }

    async fn job_for_record(&self, record_id: RecordId) -> Result<Option<Job>> {
        let conn = self.client.get_connection().await?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE record_id = $1");
        conn.query_opt(&sql, &[&record_id.value()])
            .await?
            .as_ref()
            .map(job_from_row)
            .transpose()
    }
}

#[async_trait]
impl DeliveryLog for PostgreSQLStore {
    async fn log_delivery(&self, entry: &DeliveryLogEntry) -> Result<()> {
        let conn = self.client.get_connection().await?;
        conn.execute(
            "INSERT INTO delivery_log (job_id, response_code, response_body, sent_at) \
             VALUES ($1, $2, $3, $4)",
            &[
                &entry.job_id.value(),
                &i32::from(entry.response_code),
                &entry.response_body,
                &entry.sent_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn deliveries_for_job(&self, job_id: JobId) -> Result<Vec<DeliveryLogEntry>> {
        let conn = self.client.get_connection().await?;
        let rows = conn
            .query(
                "SELECT job_id, response_code, response_body, sent_at \
                 FROM delivery_log WHERE job_id = $1 ORDER BY id",
                &[&job_id.value()],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let code: i32 = row.try_get("response_code")?;
                Ok(DeliveryLogEntry {
                    job_id: JobId::new(row.try_get("job_id")?),
                    response_code: u16::try_from(code).map_err(|_| {
                        ErpSyncError::Database(format!("Invalid response_code {code}"))
                    })?,
                    response_body: row.try_get("response_body")?,
                    sent_at: row.try_get("sent_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SyncStore for PostgreSQLStore {
    fn backend_name(&self) -> &'static str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }
}
