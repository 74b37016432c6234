//! Configuration management for ERP Sync.
//!
//! TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! ERP Sync uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `ERPSYNC_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation before anything connects
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use erp_sync::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("erp-sync.toml")?;
//!
//! println!("Source: {}", config.source.base_url);
//! println!("Collection: {}", config.downstream.collection());
//! println!("Fetch every {} minutes", config.sync.fetch_interval_minutes);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`SourceConfig`] - ERP API endpoint, transaction type, timeout
//! - [`DownstreamConfig`] - Downstream API, plant code, admin credentials
//! - [`SyncConfig`] - Loop intervals, fetch window, reaper and shutdown timeouts
//! - [`RetryConfig`] - Delivery backoff schedule
//! - [`SqliteConfig`] / [`PostgreSQLConfig`] - Persistent store
//! - [`LoggingConfig`] - File logging
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//! store_target = "sqlite"
//!
//! [source]
//! base_url = "https://erp.example.com/api/transactions"
//! txn_type = "BOM"
//!
//! [downstream]
//! base_url = "https://pb.example.com"
//! plant_code = "P100"
//! admin_email = "sync@example.com"
//! admin_password = "${ERPSYNC_DOWNSTREAM_PASSWORD}"
//!
//! [sync]
//! fetch_interval_minutes = 60
//! days_back = 367
//!
//! [sqlite]
//! path = "/var/lib/erp-sync/erp_sync.db"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, DownstreamConfig, Environment, ErpSyncConfig, LoggingConfig,
    PostgreSQLConfig, RetryConfig, SourceConfig, SqliteConfig, StoreTarget, SyncConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
