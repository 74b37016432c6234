//! Status command implementation
//!
//! This module implements the `status` command for displaying queue depth
//! and the failed jobs awaiting manual remediation.

use super::load_or_report;
use crate::adapters::database::create_sync_store;
use crate::domain::{Job, JobStatus, QueueDepth};
use clap::Args;
use serde::Serialize;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of most recent failed jobs to list
    #[arg(long, default_value_t = 10)]
    pub failed_limit: usize,
}

#[derive(Debug, Serialize)]
struct FailedJobReport {
    #[serde(flatten)]
    job: Job,
    last_response_code: Option<u16>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    backend: &'static str,
    queue_depth: QueueDepth,
    failed_jobs: Vec<FailedJobReport>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let store = match create_sync_store(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {}", e);
                return Ok(4); // Connection error exit code
            }
        };

        let queue_depth = store.queue_depth().await?;
        let mut failed_jobs = Vec::new();
        for job in store.list_jobs(JobStatus::Failed, self.failed_limit).await? {
            let last_response_code = store
                .deliveries_for_job(job.id)
                .await?
                .last()
                .map(|entry| entry.response_code);
            failed_jobs.push(FailedJobReport {
                job,
                last_response_code,
            });
        }

        let report = StatusReport {
            backend: store.backend_name(),
            queue_depth,
            failed_jobs,
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(0);
        }

        print_report(&report);
        Ok(0)
    }
}

fn print_report(report: &StatusReport) {
    println!("📊 Sync Status ({})", report.backend);
    println!();
    for status in JobStatus::ALL {
        println!("  {:<12} {}", status.as_str(), report.queue_depth.get(status));
    }
    println!("  {:<12} {}", "total", report.queue_depth.total());
    println!();

    if report.failed_jobs.is_empty() {
        println!("No failed jobs.");
        return;
    }

    println!("Most recent failed jobs:");
    println!();
    println!(
        "{:<10} {:<10} {:<8} {:<6} {:<22} {}",
        "Job", "Record", "Retries", "Code", "Updated", "Last Error"
    );
    println!("{}", "-".repeat(100));

    for failed in &report.failed_jobs {
        let job = &failed.job;
        println!(
            "{:<10} {:<10} {:<8} {:<6} {:<22} {}",
            job.id.value(),
            job.record_id.value(),
            job.retry_count,
            failed
                .last_response_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.last_error.as_deref().unwrap_or("")
        );
    }
    println!();
    println!("Run 'erp-sync requeue-failed' to retry them.");
}
