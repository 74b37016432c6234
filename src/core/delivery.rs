//! Delivery pass
//!
//! Drains the job queue into the downstream store. Each claimed job is turned
//! into a downstream document and written with find-then-update-or-create, so
//! a redelivered record never produces a second downstream row. Every attempt
//! leaves one delivery log entry.

use crate::adapters::database::traits::SyncStore;
use crate::adapters::downstream::{DownstreamResponse, DownstreamStore};
use crate::core::retry::RetryPolicy;
use crate::domain::{ClaimedJob, DeliveryLogEntry, JobId, JobStatus, RawRecord, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Status recorded for failures that carried no HTTP status
pub const FALLBACK_FAILURE_CODE: u16 = 500;

/// What happened to a claimed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    /// Failed and requeued with backoff
    Retrying,
    /// Failed with retries exhausted
    Failed,
}

/// Counters of one drain of the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Jobs whose bookkeeping hit a store error; the reaper returns them
    pub errors: usize,
}

impl ProcessSummary {
    pub fn attempted(&self) -> usize {
        self.delivered + self.retrying + self.failed + self.errors
    }

    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Delivered => self.delivered += 1,
            JobOutcome::Retrying => self.retrying += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }
}

/// Delivers claimed jobs and records their outcome
#[derive(Clone)]
pub struct DeliveryProcessor {
    store: Arc<dyn SyncStore>,
    downstream: Arc<dyn DownstreamStore>,
    policy: RetryPolicy,
}

impl DeliveryProcessor {
    pub fn new(
        store: Arc<dyn SyncStore>,
        downstream: Arc<dyn DownstreamStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            downstream,
            policy,
        }
    }

    pub fn downstream(&self) -> &Arc<dyn DownstreamStore> {
        &self.downstream
    }

    /// Claims and processes jobs until none is eligible or `shutdown` is set
    ///
    /// A job that fails does not stop the drain. Only a failure to claim
    /// returns an error.
    pub async fn process_all(&self, shutdown: &watch::Receiver<bool>) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();

        loop {
            if *shutdown.borrow() {
                tracing::debug!("Shutdown requested, leaving remaining jobs queued");
                break;
            }

            let Some(claimed) = self.store.claim_next(Utc::now()).await? else {
                break;
            };

            let job_id = claimed.job.id;
            match self.process_one(claimed).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(
                        job_id = %job_id,
                        error = %e,
                        "Failed to record delivery outcome, job left for the reaper"
                    );
                }
            }
        }

        if summary.attempted() > 0 {
            tracing::info!(
                delivered = summary.delivered,
                retrying = summary.retrying,
                failed = summary.failed,
                errors = summary.errors,
                "Queue drained"
            );
        }
        Ok(summary)
    }

    /// Delivers one claimed job, logs the attempt and settles the job
    ///
    /// # Errors
    ///
    /// Only store errors are returned; delivery failures are recorded on the
    /// job instead.
    pub async fn process_one(&self, claimed: ClaimedJob) -> Result<JobOutcome> {
        let job_id = claimed.job.id;
        let natural_key = claimed.record.natural_key.clone();

        match self.deliver(&claimed.record).await {
            Ok(response) => {
                self.log_attempt(job_id, response.status, response.body).await?;
                self.store.complete(job_id, Utc::now()).await?;
                crate::log_delivery_outcome!(job_id, natural_key, response.status);
                Ok(JobOutcome::Delivered)
            }
            Err(e) => {
                let code = e.status_code().unwrap_or(FALLBACK_FAILURE_CODE);
                let message = e.to_string();
                self.log_attempt(job_id, code, message.clone()).await?;
                crate::log_delivery_outcome!(job_id, natural_key, code);

                let status = self
                    .store
                    .fail(job_id, &message, &self.policy, Utc::now())
                    .await?;
                crate::log_retry_scheduled!(job_id, claimed.job.retry_count + 1, status, message);

                Ok(match status {
                    JobStatus::Failed => JobOutcome::Failed,
                    _ => JobOutcome::Retrying,
                })
            }
        }
    }

    async fn deliver(&self, raw: &RawRecord) -> Result<DownstreamResponse> {
        let record = raw.record()?;
        let key = record.composite_key()?;
        let document = record.to_downstream_document()?;

        match self.downstream.find_by_key(&key).await? {
            Some(id) => {
                tracing::debug!(record_id = %raw.id, downstream_id = %id, "Updating downstream record");
                self.downstream.update(&id, &document).await
            }
            None => {
                tracing::debug!(record_id = %raw.id, "Creating downstream record");
                self.downstream.create(&document).await
            }
        }
    }

    async fn log_attempt(&self, job_id: JobId, code: u16, body: String) -> Result<()> {
        let entry = DeliveryLogEntry::new(job_id, code, body, Utc::now());
        self.store.log_delivery(&entry).await
    }
}
