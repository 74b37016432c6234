//! CLI command implementations
//!
//! Commands return process exit codes: 0 success, 1 partial success, 2
//! configuration error, 4 connection error, 5 fatal error.

pub mod init;
pub mod requeue;
pub mod run;
pub mod status;
pub mod trigger;
pub mod validate;

use crate::config::{load_config, ErpSyncConfig};

/// Loads the configuration, printing the failure and returning exit code 2
pub(crate) fn load_or_report(config_path: &str) -> Result<ErpSyncConfig, i32> {
    load_config(config_path).map_err(|e| {
        tracing::error!(error = %e, config_path = %config_path, "Failed to load configuration");
        println!("❌ Failed to load configuration file");
        println!("   Error: {e}");
        2 // Configuration error exit code
    })
}
