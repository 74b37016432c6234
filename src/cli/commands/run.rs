//! Run command implementation
//!
//! Starts the sync worker and keeps it running until SIGINT or SIGTERM.

use super::load_or_report;
use crate::core::worker::build_worker;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the start-up fetch even if sync.run_on_startup is set
    #[arg(long)]
    pub no_initial_fetch: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        mut shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        if self.no_initial_fetch {
            tracing::info!("Start-up fetch disabled from CLI");
            config.sync.run_on_startup = false;
        }

        let worker = match build_worker(&config).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize sync worker");
                eprintln!("❌ Failed to initialize sync worker: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        worker.start().await?;
        println!(
            "🔄 Sync worker running (fetch every {} min, collection {})",
            config.sync.fetch_interval_minutes,
            config.downstream.collection()
        );
        println!("   Press Ctrl+C to stop");

        if shutdown_signal.wait_for(|stop| *stop).await.is_err() {
            tracing::warn!("Shutdown channel closed, stopping worker");
        }

        let report = worker.shutdown().await;
        if report.is_clean() {
            println!("✅ Sync worker stopped");
            Ok(0)
        } else {
            println!(
                "⚠️  Sync worker stopped, aborted loops: {}",
                report.aborted.join(", ")
            );
            Ok(5) // Fatal error exit code
        }
    }
}
