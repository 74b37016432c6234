//! Worker controller owning the fetch, process and reaper loops

use super::stats::{SyncStats, SyncStatus};
use crate::adapters::database::traits::SyncStore;
use crate::adapters::downstream::DownstreamStore;
use crate::adapters::source::SourceClient;
use crate::config::ErpSyncConfig;
use crate::core::delivery::{DeliveryProcessor, ProcessSummary};
use crate::core::ingest::{fetch_and_store, FetchWindow, IngestOutcome};
use crate::core::retry::RetryPolicy;
use crate::domain::{ErpSyncError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Loop cadence and fetch settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub fetch_interval: Duration,
    pub process_interval: Duration,
    pub reaper_interval: Duration,
    pub reaper_timeout: chrono::Duration,
    /// Run the first fetch immediately instead of after one interval
    pub run_on_startup: bool,
    pub shutdown_timeout: Duration,
    pub txn_type: Option<String>,
    pub scheduled_window: FetchWindow,
    pub trigger_days_back: u32,
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &ErpSyncConfig) -> Self {
        let sync = &config.sync;
        Self {
            fetch_interval: Duration::from_secs(sync.fetch_interval_minutes * 60),
            process_interval: Duration::from_secs(sync.process_interval_seconds),
            reaper_interval: Duration::from_secs(sync.reaper_interval_seconds),
            reaper_timeout: chrono::Duration::minutes(sync.reaper_timeout_minutes as i64),
            run_on_startup: sync.run_on_startup,
            shutdown_timeout: Duration::from_secs(sync.shutdown_timeout_secs),
            txn_type: config.source.txn_type.clone(),
            scheduled_window: FetchWindow::scheduled(sync),
            trigger_days_back: sync.trigger_days_back,
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// Result of a manual trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerResult {
    pub stored: usize,
    pub queued: usize,
}

/// How the loops ended on shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that exceeded the shutdown window and were aborted
    pub aborted: Vec<&'static str>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

struct RunningLoops {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

struct WorkerInner {
    store: Arc<dyn SyncStore>,
    source: Arc<dyn SourceClient>,
    processor: DeliveryProcessor,
    settings: WorkerSettings,
    stats: RwLock<SyncStats>,
    last_fetch_at: RwLock<Option<DateTime<Utc>>>,
    fetch_lock: Mutex<()>,
    syncing: AtomicBool,
}

/// Clears the in-progress flag even if the pass panics
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Background sync worker
///
/// Constructed by the entry point and shared by reference. [`start`] spawns
/// three loops, each on its own ticker, all watching one shutdown channel.
///
/// [`start`]: SyncWorker::start
pub struct SyncWorker {
    inner: Arc<WorkerInner>,
    loops: Mutex<Option<RunningLoops>>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn SyncStore>,
        source: Arc<dyn SourceClient>,
        downstream: Arc<dyn DownstreamStore>,
        settings: WorkerSettings,
    ) -> Self {
        let processor = DeliveryProcessor::new(Arc::clone(&store), downstream, settings.retry);

        Self {
            inner: Arc::new(WorkerInner {
                store,
                source,
                processor,
                settings,
                stats: RwLock::new(SyncStats::default()),
                last_fetch_at: RwLock::new(None),
                fetch_lock: Mutex::new(()),
                syncing: AtomicBool::new(false),
            }),
            loops: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.inner.store
    }

    /// Spawns the fetch, process and reaper loops
    ///
    /// A failed downstream login is logged and the loops start anyway; the
    /// client logs in again on its first rejected call.
    ///
    /// # Errors
    ///
    /// Returns [`ErpSyncError::Worker`] if the loops are already running.
    pub async fn start(&self) -> Result<()> {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            return Err(ErpSyncError::Worker("worker is already running".to_string()));
        }

        if let Err(e) = self.inner.processor.downstream().authenticate().await {
            tracing::warn!(error = %e, "Downstream authentication failed at startup, continuing");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = &self.inner.settings;

        let fetch = {
            let inner = Arc::clone(&self.inner);
            run_loop(
                "fetch",
                settings.fetch_interval,
                settings.run_on_startup,
                shutdown_rx.clone(),
                move || {
                    let inner = Arc::clone(&inner);
                    async move { inner.fetch_tick().await }
                },
            )
        };

        let process = {
            let inner = Arc::clone(&self.inner);
            let tick_shutdown = shutdown_rx.clone();
            run_loop(
                "process",
                settings.process_interval,
                true,
                shutdown_rx.clone(),
                move || {
                    let inner = Arc::clone(&inner);
                    let shutdown = tick_shutdown.clone();
                    async move { inner.process_tick(&shutdown).await }
                },
            )
        };

        let reaper = {
            let inner = Arc::clone(&self.inner);
            run_loop(
                "reaper",
                settings.reaper_interval,
                true,
                shutdown_rx,
                move || {
                    let inner = Arc::clone(&inner);
                    async move { inner.reaper_tick().await }
                },
            )
        };

        *loops = Some(RunningLoops {
            shutdown_tx,
            handles: vec![
                ("fetch", tokio::spawn(fetch)),
                ("process", tokio::spawn(process)),
                ("reaper", tokio::spawn(reaper)),
            ],
        });

        tracing::info!(
            fetch_interval_secs = settings.fetch_interval.as_secs(),
            process_interval_secs = settings.process_interval.as_secs(),
            reaper_interval_secs = settings.reaper_interval.as_secs(),
            backend = self.inner.store.backend_name(),
            "Sync worker started"
        );
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.loops.lock().await.is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    /// Stops the loops and waits for their current iterations
    ///
    /// Stopping an idle worker is a no-op. The wait is bounded by the shutdown
    /// timeout; loops still running after it are aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ErpSyncError::SyncInProgress`] while a fetch pass is running.
    pub async fn stop(&self) -> Result<()> {
        if self.is_syncing() {
            return Err(ErpSyncError::SyncInProgress(
                "a fetch pass is running; retry once it completes".to_string(),
            ));
        }

        let Some(running) = self.loops.lock().await.take() else {
            return Ok(());
        };

        let report = self.join_loops(running).await;
        tracing::info!(clean = report.is_clean(), "Sync worker stopped");
        Ok(())
    }

    /// Signals the loops and waits up to the shutdown timeout
    ///
    /// Loops still running when the window closes are aborted and listed in
    /// the report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let Some(running) = self.loops.lock().await.take() else {
            return ShutdownReport::default();
        };

        let report = self.join_loops(running).await;
        tracing::info!(clean = report.is_clean(), "Sync worker shut down");
        report
    }

    async fn join_loops(&self, running: RunningLoops) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let _ = running.shutdown_tx.send(true);
        let deadline = Instant::now() + self.inner.settings.shutdown_timeout;

        for (name, mut handle) in running.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(loop_name = name, "Loop finished"),
                Ok(Err(e)) => tracing::error!(loop_name = name, error = %e, "Loop task failed"),
                Err(_) => {
                    handle.abort();
                    tracing::warn!(loop_name = name, "Loop did not finish in time, aborted");
                    report.aborted.push(name);
                }
            }
        }

        report
    }

    /// Runs one fetch-and-store pass on demand
    ///
    /// Works whether or not the loops are running. Waits for a scheduled pass
    /// that is already in flight.
    pub async fn trigger(&self, from_date: Option<NaiveDate>) -> Result<TriggerResult> {
        let window = FetchWindow::for_trigger(from_date, self.inner.settings.trigger_days_back);
        let outcome = self.inner.run_fetch_pass(window).await?;
        Ok(TriggerResult {
            stored: outcome.stored,
            queued: outcome.queued,
        })
    }

    /// Drains the queue once, outside the process loop
    pub async fn process_pending(&self) -> Result<ProcessSummary> {
        let (_tx, rx) = watch::channel(false);
        self.inner.processor.process_all(&rx).await
    }

    pub async fn stats(&self) -> SyncStats {
        self.inner.stats.read().await.clone()
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let queue_depth = self.inner.store.queue_depth().await?;
        Ok(SyncStatus {
            scheduler_running: self.is_running().await,
            sync_in_progress: self.is_syncing(),
            queue_depth,
            last_fetch_at: *self.inner.last_fetch_at.read().await,
            current_sync_stats: self.stats().await,
        })
    }
}

impl WorkerInner {
    async fn run_fetch_pass(&self, window: FetchWindow) -> Result<IngestOutcome> {
        let _serialized = self.fetch_lock.lock().await;
        self.syncing.store(true, Ordering::SeqCst);
        let _syncing = SyncingGuard(&self.syncing);

        let query = window.query(self.settings.txn_type.clone());
        *self.stats.write().await =
            SyncStats::started(self.source.endpoint(), query.describe(), Utc::now());

        match fetch_and_store(self.source.as_ref(), self.store.as_ref(), &query).await {
            Ok(outcome) => {
                let now = Utc::now();
                self.stats.write().await.finish(&outcome, now);
                *self.last_fetch_at.write().await = Some(now);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.write().await.abort(e.to_string(), Utc::now());
                Err(e)
            }
        }
    }

    async fn fetch_tick(&self) {
        match self.run_fetch_pass(self.settings.scheduled_window).await {
            Ok(_) => {}
            Err(e) if e.is_source_unavailable() => {
                tracing::warn!(error = %e, "Source unavailable, retrying on next tick");
            }
            Err(e) => crate::log_error_with_context!(e, "Scheduled fetch failed"),
        }
    }

    async fn process_tick(&self, shutdown: &watch::Receiver<bool>) {
        if let Err(e) = self.processor.process_all(shutdown).await {
            crate::log_error_with_context!(e, "Queue drain failed");
        }
    }

    async fn reaper_tick(&self) {
        match self
            .store
            .reap_stuck(self.settings.reaper_timeout, Utc::now())
            .await
        {
            Ok(0) => {}
            Ok(reaped) => tracing::info!(reaped, "Requeued stuck jobs"),
            Err(e) => crate::log_error_with_context!(e, "Reaper scan failed"),
        }
    }
}

/// Drives `tick` on a fixed period until `shutdown` is set
///
/// A tick is never interrupted; cancellation is observed between ticks. A
/// panicking tick is logged and the loop continues.
async fn run_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    immediate: bool,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let start = if immediate {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(loop_name = name, period_secs = period.as_secs(), "Loop started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(panic) = AssertUnwindSafe(tick()).catch_unwind().await {
                    tracing::error!(
                        loop_name = name,
                        panic = %panic_message(panic.as_ref()),
                        "Loop iteration panicked"
                    );
                }
            }
        }
    }

    tracing::debug!(loop_name = name, "Loop stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
