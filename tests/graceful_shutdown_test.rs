//! Integration tests for worker start, stop and graceful shutdown
//!
//! These tests verify that:
//! - The loops fetch and deliver on their own once started
//! - Starting twice is rejected
//! - Stopping is refused while a fetch pass is running
//! - Shutdown waits for the loops and reports a clean exit

mod common;

use async_trait::async_trait;
use common::{item, key, FakeDownstream, FakeSource};
use erp_sync::adapters::database::{JobQueue, SyncStore};
use erp_sync::adapters::downstream::DownstreamStore;
use erp_sync::adapters::source::{FetchQuery, SourceClient};
use erp_sync::adapters::sqlite::SqliteStore;
use erp_sync::core::ingest::FetchWindow;
use erp_sync::core::retry::RetryPolicy;
use erp_sync::core::worker::{SyncWorker, WorkerSettings};
use erp_sync::adapters::downstream::DownstreamResponse;
use erp_sync::domain::{CompositeKey, ErpSyncError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn settings() -> WorkerSettings {
    WorkerSettings {
        fetch_interval: Duration::from_secs(3600),
        process_interval: Duration::from_millis(20),
        reaper_interval: Duration::from_secs(3600),
        reaper_timeout: chrono::Duration::minutes(10),
        run_on_startup: true,
        shutdown_timeout: Duration::from_secs(5),
        txn_type: Some("BOM".to_string()),
        scheduled_window: FetchWindow::Unfiltered,
        trigger_days_back: 365,
        retry: RetryPolicy::default(),
    }
}

fn worker_with(
    source: Arc<dyn SourceClient>,
    downstream: Arc<FakeDownstream>,
    settings: WorkerSettings,
) -> SyncWorker {
    let store: Arc<dyn SyncStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    SyncWorker::new(
        store,
        source,
        downstream as Arc<dyn DownstreamStore>,
        settings,
    )
}

/// Waits up to two seconds for `check` to hold
async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Source whose fetch blocks until released
#[derive(Default)]
struct GatedSource {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SourceClient for GatedSource {
    async fn fetch(&self, _query: &FetchQuery) -> Result<Vec<Value>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![item("SO-9", 10, "PART-Z", 1.0)])
    }

    fn endpoint(&self) -> &str {
        "http://erp.test/gated"
    }
}

/// Downstream whose lookups never return
#[derive(Default)]
struct StalledDownstream {
    entered: AtomicBool,
}

#[async_trait]
impl DownstreamStore for StalledDownstream {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn find_by_key(&self, _key: &CompositeKey) -> Result<Option<String>> {
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn create(&self, _document: &Value) -> Result<DownstreamResponse> {
        std::future::pending().await
    }

    async fn update(&self, _id: &str, _document: &Value) -> Result<DownstreamResponse> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_started_worker_fetches_and_delivers() {
    let source = Arc::new(FakeSource::with_items(vec![
        item("SO-1", 10, "PART-A", 4.0),
        item("SO-1", 20, "PART-B", 2.0),
    ]));
    let downstream = Arc::new(FakeDownstream::default());
    let worker = worker_with(source.clone(), Arc::clone(&downstream), settings());

    worker.start().await.unwrap();
    assert!(worker.is_running().await);

    eventually(|| downstream.len() == 2).await;
    assert!(downstream.get(&key("SO-1", 20, "PART-B")).is_some());
    assert_eq!(downstream.logins(), 1);

    let queries = source.queries();
    assert_eq!(queries[0].txn_type.as_deref(), Some("BOM"));
    assert_eq!(queries[0].from_date, None);

    let report = worker.shutdown().await;
    assert!(report.is_clean());
    assert!(!worker.is_running().await);

    let status = worker.status().await.unwrap();
    assert!(!status.scheduler_running);
    assert_eq!(status.queue_depth.done, 2);
    assert!(status.last_fetch_at.is_some());
    assert_eq!(status.current_sync_stats.total_fetched, 2);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let worker = worker_with(
        Arc::new(FakeSource::default()),
        Arc::new(FakeDownstream::default()),
        settings(),
    );

    worker.start().await.unwrap();
    let err = worker.start().await.unwrap_err();
    assert!(matches!(err, ErpSyncError::Worker(_)));

    worker.stop().await.unwrap();
    assert!(!worker.is_running().await);

    // A stopped worker can be started again
    worker.start().await.unwrap();
    assert!(worker.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_stop_and_shutdown_on_idle_worker_are_noops() {
    let worker = worker_with(
        Arc::new(FakeSource::default()),
        Arc::new(FakeDownstream::default()),
        settings(),
    );

    worker.stop().await.unwrap();
    assert!(worker.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_stop_is_refused_during_a_fetch_pass() {
    let source = Arc::new(GatedSource::default());
    let worker = Arc::new(worker_with(
        source.clone(),
        Arc::new(FakeDownstream::default()),
        settings(),
    ));

    let trigger = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.trigger(None).await })
    };

    source.entered.notified().await;
    assert!(worker.is_syncing());
    assert!(worker.stats().await.is_syncing);

    let err = worker.stop().await.unwrap_err();
    assert!(matches!(err, ErpSyncError::SyncInProgress(_)));

    source.release.notify_one();
    let result = trigger.await.unwrap().unwrap();
    assert_eq!(result.stored, 1);
    assert_eq!(result.queued, 1);

    assert!(!worker.is_syncing());
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn test_trigger_uses_trigger_window() {
    let source = Arc::new(FakeSource::default());
    let worker = worker_with(
        source.clone(),
        Arc::new(FakeDownstream::default()),
        settings(),
    );

    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    worker.trigger(Some(date)).await.unwrap();
    worker.trigger(None).await.unwrap();

    let queries = source.queries();
    assert_eq!(queries[0].from_date, Some(date));
    let today = chrono::Utc::now().date_naive();
    let expected = FetchWindow::DaysBack(365).resolve(today);
    assert_eq!(queries[1].from_date, expected);
}

#[tokio::test]
async fn test_source_outage_keeps_the_worker_running() {
    let source = Arc::new(FakeSource::default());
    source.set_unavailable(true);
    let worker = worker_with(
        source.clone(),
        Arc::new(FakeDownstream::default()),
        settings(),
    );

    let err = worker.trigger(None).await.unwrap_err();
    assert!(err.is_source_unavailable());
    assert!(worker.stats().await.last_error.is_some());

    worker.start().await.unwrap();
    eventually(|| source.queries().len() >= 2).await;
    assert!(worker.is_running().await);
    assert!(worker.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_process_pending_drains_without_loops() {
    let source = Arc::new(FakeSource::with_items(vec![item("SO-1", 10, "PART-A", 4.0)]));
    let downstream = Arc::new(FakeDownstream::default());
    let worker = worker_with(source, Arc::clone(&downstream), settings());

    worker.trigger(None).await.unwrap();
    assert_eq!(worker.store().queue_depth().await.unwrap().queued, 1);

    let summary = worker.process_pending().await.unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(downstream.len(), 1);
}

#[tokio::test]
async fn test_stop_is_bounded_by_shutdown_timeout() {
    let downstream = Arc::new(StalledDownstream::default());
    let store: Arc<dyn SyncStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let worker = SyncWorker::new(
        store,
        Arc::new(FakeSource::with_items(vec![item("SO-1", 10, "PART-A", 4.0)])),
        Arc::clone(&downstream) as Arc<dyn DownstreamStore>,
        WorkerSettings {
            shutdown_timeout: Duration::from_millis(100),
            ..settings()
        },
    );

    worker.start().await.unwrap();
    eventually(|| downstream.entered.load(Ordering::SeqCst)).await;
    eventually(|| !worker.is_syncing()).await;

    tokio::time::timeout(Duration::from_secs(2), worker.stop())
        .await
        .expect("stop returns once the shutdown window closes")
        .unwrap();
    assert!(!worker.is_running().await);
}
