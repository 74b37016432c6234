//! Trigger command implementation
//!
//! Runs a single fetch-and-store pass, optionally draining the queue
//! afterwards, without starting the background loops.

use super::load_or_report;
use crate::core::ingest::parse_from_date;
use crate::core::worker::build_worker;
use clap::Args;

/// Arguments for the trigger command
#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Fetch records from this date (YYYY-MM-DD); defaults to sync.trigger_days_back days ago
    #[arg(long, value_name = "DATE")]
    pub from_date: Option<String>,

    /// Deliver queued jobs once the pass completes
    #[arg(long)]
    pub process: bool,
}

impl TriggerArgs {
    /// Execute the trigger command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let from_date = match self.from_date.as_deref().map(parse_from_date).transpose() {
            Ok(date) => date,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let worker = match build_worker(&config).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize sync worker");
                eprintln!("❌ Failed to initialize sync worker: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let result = match worker.trigger(from_date).await {
            Ok(r) => r,
            Err(e) if e.is_source_unavailable() => {
                eprintln!("❌ Source unavailable: {e}");
                return Ok(4); // Connection error exit code
            }
            Err(e) => {
                eprintln!("❌ Fetch pass failed: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        println!("{}", serde_json::to_string(&result)?);

        let invalid = worker.stats().await.invalid;
        let mut partial = invalid > 0;
        if invalid > 0 {
            println!("⚠️  {invalid} record(s) skipped by validation");
        }

        if self.process {
            let summary = worker.process_pending().await?;
            println!(
                "📤 Delivered {}, retrying {}, failed {}",
                summary.delivered, summary.retrying, summary.failed
            );
            partial |= summary.retrying + summary.failed + summary.errors > 0;
        }

        Ok(if partial { 1 } else { 0 })
    }
}
