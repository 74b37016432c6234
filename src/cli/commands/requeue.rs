//! Requeue-failed command implementation

use super::load_or_report;
use crate::adapters::database::create_sync_store;
use crate::domain::JobId;
use chrono::Utc;
use clap::Args;

/// Arguments for the requeue-failed command
#[derive(Args, Debug)]
pub struct RequeueArgs {
    /// Requeue only this job (default: every failed job)
    #[arg(long)]
    pub job_id: Option<i64>,
}

impl RequeueArgs {
    /// Execute the requeue-failed command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
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

        let job_id = self.job_id.map(JobId::new);
        let requeued = store.requeue_failed(job_id, Utc::now()).await?;
        tracing::info!(requeued, job_id = ?self.job_id, "Requeued failed jobs");

        match (job_id, requeued) {
            (Some(id), 0) => {
                println!("⚠️  Job {id} is not in the failed state");
                Ok(1)
            }
            _ => {
                println!("✅ Requeued {requeued} failed job(s)");
                Ok(0)
            }
        }
    }
}
