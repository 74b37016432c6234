//! Fetch-and-store pass
//!
//! Pulls the result set from the source, validates each item once, upserts it
//! into the ingestion store and enqueues a delivery job for new or changed
//! records.

use crate::adapters::database::traits::{IngestionStore, JobQueue};
use crate::adapters::source::{FetchQuery, SourceClient, FROM_DATE_FORMAT};
use crate::config::SyncConfig;
use crate::domain::{ErpRecord, ErpSyncError, Result};
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Lower bound of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// No `fromDate` filter
    Unfiltered,
    /// Fixed start date
    FromDate(NaiveDate),
    /// Today (UTC) minus N days, resolved when the pass starts
    DaysBack(u32),
}

impl FetchWindow {
    /// Window for scheduled passes: `from_date`, then `days_back`, then none
    pub fn scheduled(config: &SyncConfig) -> Self {
        match (config.from_date, config.days_back) {
            (Some(date), _) => FetchWindow::FromDate(date),
            (None, Some(days)) => FetchWindow::DaysBack(days),
            (None, None) => FetchWindow::Unfiltered,
        }
    }

    /// Window for a manual trigger: an explicit date, else `days_back` days
    pub fn for_trigger(from_date: Option<NaiveDate>, days_back: u32) -> Self {
        match from_date {
            Some(date) => FetchWindow::FromDate(date),
            None => FetchWindow::DaysBack(days_back),
        }
    }

    /// Start date relative to `today`
    pub fn resolve(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            FetchWindow::Unfiltered => None,
            FetchWindow::FromDate(date) => Some(*date),
            FetchWindow::DaysBack(days) => Some(
                today
                    .checked_sub_days(Days::new(u64::from(*days)))
                    .unwrap_or(NaiveDate::MIN),
            ),
        }
    }

    /// Query for a pass starting today
    pub fn query(&self, txn_type: Option<String>) -> FetchQuery {
        FetchQuery {
            txn_type,
            from_date: self.resolve(Utc::now().date_naive()),
        }
    }
}

/// Parses a `YYYY-MM-DD` window start
///
/// # Errors
///
/// Returns [`ErpSyncError::Validation`] if `value` is not a calendar date.
pub fn parse_from_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), FROM_DATE_FORMAT).map_err(|e| {
        ErpSyncError::Validation(format!(
            "Invalid fromDate '{value}': expected YYYY-MM-DD ({e})"
        ))
    })
}

/// Counters of one fetch-and-store pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Items returned by the source
    pub fetched: usize,
    /// Valid records upserted into the ingestion store
    pub stored: usize,
    /// Jobs created or reopened
    pub queued: usize,
    /// Items skipped by validation
    pub invalid: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Runs one fetch-and-store pass
///
/// Invalid items are skipped and counted. A source failure aborts the pass
/// before anything is written; a store failure aborts it where it happened,
/// leaving earlier records stored and queued.
pub async fn fetch_and_store<S>(
    source: &dyn SourceClient,
    store: &S,
    query: &FetchQuery,
) -> Result<IngestOutcome>
where
    S: IngestionStore + JobQueue + ?Sized,
{
    let started = Instant::now();
    let items = source.fetch(query).await?;

    let mut outcome = IngestOutcome {
        fetched: items.len(),
        ..Default::default()
    };
    tracing::debug!(fetched = outcome.fetched, params = %query.describe(), "Source returned records");

    for (index, item) in items.iter().enumerate() {
        let validated = ErpRecord::from_source(item).and_then(|record| {
            let key = record.natural_key()?;
            let payload = record.to_payload()?;
            Ok((key, payload))
        });

        let (key, payload) = match validated {
            Ok(valid) => valid,
            Err(e) => {
                outcome.invalid += 1;
                tracing::warn!(index, error = %e, "Skipping invalid source record");
                continue;
            }
        };

        let now = Utc::now();
        let upserted = store.upsert_record(&key, &payload, now).await?;
        outcome.stored += 1;

        if let Some(job_id) = store.enqueue(upserted.record_id, upserted.changed, now).await? {
            outcome.queued += 1;
            tracing::debug!(
                record_id = %upserted.record_id,
                job_id = %job_id,
                natural_key = %key,
                changed = upserted.changed,
                "Record queued for delivery"
            );
        }
    }

    outcome.duration = started.elapsed();
    crate::log_fetch_complete!(
        outcome.fetched,
        outcome.stored,
        outcome.queued,
        outcome.invalid,
        outcome.duration
    );
    Ok(outcome)
}
