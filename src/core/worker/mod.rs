//! Background sync worker
//!
//! [`SyncWorker`] owns three loops:
//!
//! - **fetch** pulls the source on `sync.fetch_interval_minutes` (and once at
//!   start-up when `sync.run_on_startup` is set)
//! - **process** drains the job queue every `sync.process_interval_seconds`
//! - **reaper** requeues jobs stuck in `processing` every
//!   `sync.reaper_interval_seconds`
//!
//! Each loop has its own ticker; all of them watch one shutdown channel.

pub mod controller;
pub mod stats;

pub use controller::{ShutdownReport, SyncWorker, TriggerResult, WorkerSettings};
pub use stats::{SyncStats, SyncStatus};

use crate::adapters::database::create_sync_store;
use crate::adapters::downstream::PocketBaseClient;
use crate::adapters::source::ErpApiClient;
use crate::config::ErpSyncConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Builds a worker wired to the configured store, source and downstream
///
/// The loops are not started.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or an HTTP client cannot
/// be built.
pub async fn build_worker(config: &ErpSyncConfig) -> Result<SyncWorker> {
    let store = create_sync_store(config).await?;
    let source = Arc::new(ErpApiClient::new(&config.source)?);
    let downstream = Arc::new(PocketBaseClient::new(&config.downstream)?);

    tracing::debug!(
        source = %config.source.base_url,
        downstream = %config.downstream.base_url,
        collection = %config.downstream.collection(),
        "Sync worker components created"
    );

    Ok(SyncWorker::new(
        store,
        source,
        downstream,
        WorkerSettings::from_config(config),
    ))
}
