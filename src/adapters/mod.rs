//! External system integrations
//!
//! - [`source`] - ERP source API client
//! - [`downstream`] - Downstream record store client (PocketBase)
//! - [`database`] - Persistent store traits and factory
//! - [`sqlite`] - SQLite store (default)
//! - [`postgresql`] - PostgreSQL store
//!
//! Each external system sits behind a trait so the loops can be driven by
//! in-memory implementations in tests.
//!
//! ```rust,no_run
//! use erp_sync::adapters::downstream::{DownstreamStore, PocketBaseClient};
//! use erp_sync::config::DownstreamConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownstreamConfig {
//!     base_url: "http://localhost:8090".to_string(),
//!     plant_code: "P01".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = PocketBaseClient::new(&config)?;
//! client.authenticate().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod downstream;
pub mod postgresql;
pub mod source;
pub mod sqlite;
