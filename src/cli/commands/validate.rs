//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the ERP Sync configuration file.

use crate::config::load_config;
use crate::config::schema::StoreTarget;
use crate::core::ingest::FetchWindow;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after substitution and overrides
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Source: {}", config.source.base_url);
        println!(
            "  Transaction Type: {}",
            config.source.txn_type.as_deref().unwrap_or("(any)")
        );
        println!("  Downstream: {}", config.downstream.base_url);
        println!("  Collection: {}", config.downstream.collection());

        match config.store_target {
            StoreTarget::Sqlite => {
                println!("  Store: SQLite ({})", config.sqlite.path);
            }
            StoreTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!("  Store: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .as_str()
                            .split('@')
                            .next_back()
                            .unwrap_or("***")
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }

        let window = match FetchWindow::scheduled(&config.sync) {
            FetchWindow::Unfiltered => "unfiltered".to_string(),
            FetchWindow::FromDate(date) => format!("from {date}"),
            FetchWindow::DaysBack(days) => format!("last {days} days"),
        };
        println!(
            "  Fetch: every {} min, {}",
            config.sync.fetch_interval_minutes, window
        );
        println!(
            "  Retry: {} attempts, +{} min per failure, capped at {} min",
            config.retry.max_retries,
            config.retry.backoff_step_minutes,
            config.retry.backoff_cap_minutes
        );
        println!(
            "  Reaper: every {}s, timeout {} min",
            config.sync.reaper_interval_seconds, config.sync.reaper_timeout_minutes
        );
        println!();
        Ok(0)
    }
}
