//! Session statistics and status snapshot

use crate::core::ingest::IngestOutcome;
use crate::domain::QueueDepth;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters of the current or most recent fetch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub is_syncing: bool,
    pub total_fetched: usize,
    pub stored: usize,
    pub queued: usize,
    pub invalid: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub api_url: Option<String>,
    pub query_params: Option<String>,
    pub last_error: Option<String>,
}

impl SyncStats {
    /// Fresh stats for a pass that is starting now
    pub fn started(api_url: &str, query_params: String, now: DateTime<Utc>) -> Self {
        Self {
            is_syncing: true,
            started_at: Some(now),
            api_url: Some(api_url.to_string()),
            query_params: Some(query_params),
            ..Default::default()
        }
    }

    pub fn finish(&mut self, outcome: &IngestOutcome, now: DateTime<Utc>) {
        self.is_syncing = false;
        self.total_fetched = outcome.fetched;
        self.stored = outcome.stored;
        self.queued = outcome.queued;
        self.invalid = outcome.invalid;
        self.finished_at = Some(now);
    }

    pub fn abort(&mut self, error: String, now: DateTime<Utc>) {
        self.is_syncing = false;
        self.last_error = Some(error);
        self.finished_at = Some(now);
    }
}

/// Snapshot returned by [`SyncWorker::status`](super::SyncWorker::status)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub scheduler_running: bool,
    pub sync_in_progress: bool,
    pub queue_depth: QueueDepth,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub current_sync_stats: SyncStats,
}
