//! Persistent store traits
//!
//! The ingestion store, job queue and delivery log are separate traits so the
//! loops depend only on what they use. [`SyncStore`] ties them together for
//! backends that hold all three tables.
//!
//! Every operation that stamps a time takes `now` from the caller. Job state
//! transitions are single conditional updates guarded by the row's current
//! status, so concurrent workers never act on the same job twice.

use crate::core::retry::RetryPolicy;
use crate::domain::{
    ClaimedJob, DeliveryLogEntry, Job, JobId, JobStatus, NaturalKey, QueueDepth, RawRecord,
    RecordId, Result, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Content-addressed table of fetched records
#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// Inserts or updates the record for `key`
    ///
    /// A first sighting is inserted with `changed = false`. A differing content
    /// hash updates payload, hash and `fetched_at` and reports `changed = true`.
    /// An identical hash leaves the row untouched.
    async fn upsert_record(
        &self,
        key: &NaturalKey,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome>;

    /// Loads a record by id
    async fn get_record(&self, id: RecordId) -> Result<Option<RawRecord>>;
}

/// Persistent queue of delivery jobs, one per record
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Creates a queued job for `record_id` if none exists
    ///
    /// A `done` job is reopened with its retry count reset when `force` is
    /// set, or when the record's content changed after the job's last claim.
    /// The second case catches changes whose enqueue never ran, such as a
    /// pass cut off between upsert and enqueue. Queued, processing and failed
    /// jobs are left untouched. Returns the job id only when a job was created
    /// or reopened.
    async fn enqueue(
        &self,
        record_id: RecordId,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<JobId>>;

    /// Atomically moves the oldest eligible queued job to `processing`
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>>;

    /// Marks a processing job as done
    ///
    /// # Errors
    ///
    /// [`ErpSyncError::JobState`](crate::domain::ErpSyncError::JobState) if
    /// the job is not currently processing.
    async fn complete(&self, job_id: JobId, now: DateTime<Utc>) -> Result<()>;

    /// Records a failed attempt and applies `policy`
    ///
    /// Returns the job's new status: `queued` with a delayed `next_attempt_at`,
    /// or `failed` with `next_attempt_at` cleared.
    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<JobStatus>;

    /// Returns processing jobs whose last attempt is older than `timeout` to the queue
    async fn reap_stuck(&self, timeout: Duration, now: DateTime<Utc>) -> Result<u64>;

    /// Reopens failed jobs (one, or all when `job_id` is `None`)
    async fn requeue_failed(&self, job_id: Option<JobId>, now: DateTime<Utc>) -> Result<u64>;

    async fn queue_depth(&self) -> Result<QueueDepth>;

    /// Most recently updated jobs with `status`, newest first
    async fn list_jobs(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>>;

    async fn job_for_record(&self, record_id: RecordId) -> Result<Option<Job>>;
}

/// Append-only audit of delivery attempts
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn log_delivery(&self, entry: &DeliveryLogEntry) -> Result<()>;

    /// Entries for one job in the order they were written
    async fn deliveries_for_job(&self, job_id: JobId) -> Result<Vec<DeliveryLogEntry>>;
}

/// A backend holding all three tables
#[async_trait]
pub trait SyncStore: IngestionStore + JobQueue + DeliveryLog {
    /// Short backend name for logs and status output
    fn backend_name(&self) -> &'static str;

    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Creates tables and indexes if they do not exist
    async fn ensure_schema(&self) -> Result<()>;
}
