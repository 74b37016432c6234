//! Core sync logic
//!
//! # Modules
//!
//! - [`hashing`] - Canonical content hash for change detection
//! - [`retry`] - Linear, capped delivery backoff
//! - [`ingest`] - Fetch-and-store pass and fetch windows
//! - [`delivery`] - Queue drain into the downstream store
//! - [`worker`] - Worker controller running the fetch, process and reaper loops
//!
//! # Data flow
//!
//! 1. **Fetch**: pull the full result set from the ERP source
//! 2. **Validate**: parse each item into an [`ErpRecord`](crate::domain::ErpRecord), skipping invalid ones
//! 3. **Store**: upsert by natural key; the content hash decides whether it changed
//! 4. **Enqueue**: one job per record, reopened when a delivered record changes
//! 5. **Deliver**: find by natural key, then update or create downstream
//! 6. **Settle**: log the attempt, complete the job or schedule a retry
//!
//! # Example
//!
//! ```rust,no_run
//! use erp_sync::config::load_config;
//! use erp_sync::core::worker::build_worker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("erp-sync.toml")?;
//! let worker = build_worker(&config).await?;
//!
//! let result = worker.trigger(None).await?;
//! println!("stored {}, queued {}", result.stored, result.queued);
//!
//! let summary = worker.process_pending().await?;
//! println!("delivered {}", summary.delivered);
//! # Ok(())
//! # }
//! ```

pub mod delivery;
pub mod hashing;
pub mod ingest;
pub mod retry;
pub mod worker;
