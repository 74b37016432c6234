//! Integration tests for the persistent job queue
//!
//! These tests verify that:
//! - Jobs move only through the documented status transitions
//! - Failed deliveries back off linearly and fail after five attempts
//! - The reaper returns only jobs stuck past the timeout
//! - A record never has more than one active job
//! - Concurrent claimers never receive the same job

use chrono::{DateTime, Duration, TimeZone, Utc};
use erp_sync::adapters::database::{DeliveryLog, IngestionStore, JobQueue};
use erp_sync::adapters::sqlite::SqliteStore;
use erp_sync::core::retry::RetryPolicy;
use erp_sync::domain::{DeliveryLogEntry, ErpSyncError, JobId, JobStatus, NaturalKey, RecordId};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

async fn store_record(store: &SqliteStore, key: &str) -> RecordId {
    store
        .upsert_record(&NaturalKey::new(key).unwrap(), &json!({ "KEY": key }), t0())
        .await
        .unwrap()
        .record_id
}

async fn queued_job(store: &SqliteStore, key: &str) -> JobId {
    let record_id = store_record(store, key).await;
    store.enqueue(record_id, false, t0()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_job_lifecycle_to_done() {
    let store = SqliteStore::open_in_memory().unwrap();
    let job_id = queued_job(&store, "SO-1-10-A").await;

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 0);

    let claimed = store.claim_next(t0()).await.unwrap().unwrap();
    assert_eq!(claimed.job.id, job_id);
    assert_eq!(claimed.job.status, JobStatus::Processing);
    assert_eq!(claimed.job.last_attempt_at, Some(t0()));
    assert_eq!(claimed.record.natural_key.as_str(), "SO-1-10-A");

    assert!(store.claim_next(t0()).await.unwrap().is_none());

    store.complete(job_id, t0()).await.unwrap();
    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.next_attempt_at, None);

    let err = store.complete(job_id, t0()).await.unwrap_err();
    assert!(matches!(err, ErpSyncError::JobState(_)));
}

#[tokio::test]
async fn test_claim_order_is_oldest_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    let first = queued_job(&store, "SO-1-10-A").await;
    let second = queued_job(&store, "SO-1-20-B").await;

    assert_eq!(store.claim_next(t0()).await.unwrap().unwrap().job.id, first);
    assert_eq!(store.claim_next(t0()).await.unwrap().unwrap().job.id, second);
}

#[tokio::test]
async fn test_backoff_schedule_then_failed() {
    let store = SqliteStore::open_in_memory().unwrap();
    let policy = RetryPolicy::default();
    let job_id = queued_job(&store, "SO-1-10-A").await;

    let mut now = t0();
    for failure in 1..=4 {
        let claimed = store.claim_next(now).await.unwrap().unwrap();
        assert_eq!(claimed.job.id, job_id);

        let status = store.fail(job_id, "HTTP 503", &policy, now).await.unwrap();
        assert_eq!(status, JobStatus::Queued);

        let job = store.get_job(job_id).await.unwrap().unwrap();
        let delay = Duration::minutes(5 * failure);
        assert_eq!(job.retry_count, failure as u32);
        assert_eq!(job.next_attempt_at, Some(now + delay));
        assert_eq!(job.last_error.as_deref(), Some("HTTP 503"));

        // Not eligible until the backoff has elapsed
        assert!(store
            .claim_next(now + delay - Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
        now = now + delay;
    }

    store.claim_next(now).await.unwrap().unwrap();
    let status = store.fail(job_id, "HTTP 503", &policy, now).await.unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.retry_count, 5);
    assert_eq!(job.next_attempt_at, None);
    assert!(store
        .claim_next(now + Duration::days(1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fail_requires_processing() {
    let store = SqliteStore::open_in_memory().unwrap();
    let job_id = queued_job(&store, "SO-1-10-A").await;

    let err = store
        .fail(job_id, "boom", &RetryPolicy::default(), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ErpSyncError::JobState(_)));

    let err = store
        .fail(JobId::new(999), "boom", &RetryPolicy::default(), t0())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_reaper_requeues_only_stale_jobs() {
    let store = SqliteStore::open_in_memory().unwrap();
    let stale = queued_job(&store, "SO-1-10-A").await;
    let recent = queued_job(&store, "SO-1-20-B").await;

    store.claim_next(t0()).await.unwrap().unwrap();
    store
        .claim_next(t0() + Duration::minutes(9))
        .await
        .unwrap()
        .unwrap();

    let reaped = store
        .reap_stuck(Duration::minutes(10), t0() + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(reaped, 1);

    let stale_job = store.get_job(stale).await.unwrap().unwrap();
    assert_eq!(stale_job.status, JobStatus::Queued);
    assert_eq!(stale_job.retry_count, 0);
    assert_eq!(
        store.get_job(recent).await.unwrap().unwrap().status,
        JobStatus::Processing
    );

    // A reaped job is claimable again
    let reclaimed = store
        .claim_next(t0() + Duration::minutes(12))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.job.id, stale);
}

#[tokio::test]
async fn test_one_active_job_per_record() {
    let store = SqliteStore::open_in_memory().unwrap();
    let record_id = store_record(&store, "SO-1-10-A").await;

    let first = store.enqueue(record_id, false, t0()).await.unwrap();
    assert!(first.is_some());
    assert!(store.enqueue(record_id, false, t0()).await.unwrap().is_none());
    // Forcing only reopens a finished job
    assert!(store.enqueue(record_id, true, t0()).await.unwrap().is_none());

    let claimed = store.claim_next(t0()).await.unwrap().unwrap();
    assert!(store.enqueue(record_id, true, t0()).await.unwrap().is_none());
    store.complete(claimed.job.id, t0()).await.unwrap();

    let reopened = store.enqueue(record_id, true, t0()).await.unwrap();
    assert_eq!(reopened, first);
    assert_eq!(store.queue_depth().await.unwrap().total(), 1);
    assert_eq!(
        store.job_for_record(record_id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );
}

#[tokio::test]
async fn test_done_job_reopens_when_record_changed_after_claim() {
    let store = SqliteStore::open_in_memory().unwrap();
    let key = NaturalKey::new("SO-1-10-A").unwrap();
    let record_id = store_record(&store, "SO-1-10-A").await;
    let job_id = store.enqueue(record_id, false, t0()).await.unwrap().unwrap();

    // Content changes while the job is in flight; the active job is left alone
    let claimed_at = t0() + Duration::minutes(1);
    store.claim_next(claimed_at).await.unwrap().unwrap();
    let changed_at = t0() + Duration::minutes(2);
    let upserted = store
        .upsert_record(&key, &json!({ "KEY": "SO-1-10-A", "QTY": 2 }), changed_at)
        .await
        .unwrap();
    assert!(upserted.changed);
    assert!(store.enqueue(record_id, true, changed_at).await.unwrap().is_none());
    store.complete(job_id, t0() + Duration::minutes(3)).await.unwrap();

    // A later identical fetch still reopens it
    let later = t0() + Duration::minutes(4);
    assert_eq!(store.enqueue(record_id, false, later).await.unwrap(), Some(job_id));

    // Delivered after the change, so nothing further to do
    store.claim_next(later).await.unwrap().unwrap();
    store.complete(job_id, later).await.unwrap();
    assert!(store.enqueue(record_id, false, later).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_claims_are_disjoint() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    for n in 0..20 {
        queued_job(&store, &format!("SO-{n}-10-A")).await;
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = store.claim_next(t0()).await.unwrap() {
                claimed.push(job.job.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 20);
    assert_eq!(unique.len(), 20);
    assert_eq!(store.queue_depth().await.unwrap().processing, 20);
}

#[tokio::test]
async fn test_requeue_failed() {
    let store = SqliteStore::open_in_memory().unwrap();
    let policy = RetryPolicy::new(1, Duration::minutes(5), Duration::minutes(60));
    let failed = queued_job(&store, "SO-1-10-A").await;
    let healthy = queued_job(&store, "SO-1-20-B").await;

    store.claim_next(t0()).await.unwrap().unwrap();
    assert_eq!(
        store.fail(failed, "HTTP 400", &policy, t0()).await.unwrap(),
        JobStatus::Failed
    );

    // Only failed jobs are affected
    assert_eq!(store.requeue_failed(Some(healthy), t0()).await.unwrap(), 0);

    let later = t0() + Duration::hours(1);
    assert_eq!(store.requeue_failed(None, later).await.unwrap(), 1);

    let job = store.get_job(failed).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.next_attempt_at, Some(later));
    assert_eq!(store.requeue_failed(None, later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_failed_jobs_most_recent_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    let policy = RetryPolicy::new(1, Duration::minutes(5), Duration::minutes(60));
    let a = queued_job(&store, "SO-1-10-A").await;
    let b = queued_job(&store, "SO-1-20-B").await;

    store.claim_next(t0()).await.unwrap().unwrap();
    store.fail(a, "first", &policy, t0()).await.unwrap();
    store.claim_next(t0()).await.unwrap().unwrap();
    store
        .fail(b, "second", &policy, t0() + Duration::minutes(1))
        .await
        .unwrap();

    let failed = store.list_jobs(JobStatus::Failed, 10).await.unwrap();
    let ids: Vec<_> = failed.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![b, a]);

    let limited = store.list_jobs(JobStatus::Failed, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_delivery_log_is_append_only_per_job() {
    let store = SqliteStore::open_in_memory().unwrap();
    let job_id = queued_job(&store, "SO-1-10-A").await;

    store
        .log_delivery(&DeliveryLogEntry::new(job_id, 503, "unavailable", t0()))
        .await
        .unwrap();
    store
        .log_delivery(&DeliveryLogEntry::new(
            job_id,
            200,
            "x".repeat(5000),
            t0() + Duration::minutes(5),
        ))
        .await
        .unwrap();

    let entries = store.deliveries_for_job(job_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].response_code, 503);
    assert_eq!(entries[1].response_code, 200);
    assert_eq!(entries[1].response_body.len(), 2000);
    assert_eq!(entries[1].sent_at, t0() + Duration::minutes(5));
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("queue.db");

    let job_id = {
        let store = SqliteStore::open(&path).unwrap();
        let job_id = queued_job(&store, "SO-1-10-A").await;
        store.claim_next(t0()).await.unwrap().unwrap();
        job_id
    };

    // A crash leaves the job in processing; the reaper returns it
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
        store.get_job(job_id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );
    let reaped = store
        .reap_stuck(Duration::minutes(10), t0() + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(reaped, 1);
}
