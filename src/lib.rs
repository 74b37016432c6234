// ERP Sync - ERP to downstream store sync worker
// Copyright (c) 2025 ERP Sync Contributors
// Licensed under the MIT License

//! # ERP Sync
//!
//! ERP Sync mirrors transactional records from an ERP source API into a
//! downstream record store (PocketBase) through a persistent, crash-safe job
//! queue.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Fetching** the full result set from the ERP source on a schedule
//! - **Deduplicating** records by natural key and content hash
//! - **Queueing** one delivery job per new or changed record
//! - **Delivering** jobs with an idempotent find-then-update-or-create
//! - **Recovering** jobs left in flight by a crashed worker
//!
//! ## Architecture
//!
//! ERP Sync follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (ingestion, delivery, retry, worker loops)
//! - [`adapters`] - External integrations (ERP source, PocketBase, SQLite, PostgreSQL)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use erp_sync::config::load_config;
//! use erp_sync::core::worker::build_worker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("erp-sync.toml")?;
//!     let worker = build_worker(&config).await?;
//!
//!     worker.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!
//!     let report = worker.shutdown().await;
//!     println!("clean shutdown: {}", report.is_clean());
//!     Ok(())
//! }
//! ```
//!
//! ## Change Detection
//!
//! Each fetched item is validated into an [`ErpRecord`](domain::ErpRecord)
//! and stored under its natural key `{CUST_ORDER_ID}-{CUST_ORDER_LINE_NO}-{BOM_PART_ID}`.
//! A SHA-256 hash of the canonical payload decides whether a re-fetched
//! record changed:
//!
//! ```rust
//! use erp_sync::core::hashing::content_hash;
//! use serde_json::json;
//!
//! let a = content_hash(&json!({"CUST_ORDER_ID": "SO-1", "BOM_PART_ID": "P-7"})).unwrap();
//! let b = content_hash(&json!({"BOM_PART_ID": "P-7", "CUST_ORDER_ID": "SO-1"})).unwrap();
//! assert_eq!(a, b);
//! ```
//!
//! ## Job Lifecycle
//!
//! `queued -> processing -> done`, with failures requeued after
//! `min(n * 5, 60)` minutes until five attempts have failed. A `done` job is
//! reopened when its record changes; a `failed` job waits for
//! `erp-sync requeue-failed`.
//!
//! ## Error Handling
//!
//! ERP Sync uses the [`domain::ErpSyncError`] type for all errors:
//!
//! ```rust,no_run
//! use erp_sync::domain::ErpSyncError;
//!
//! fn example() -> Result<(), ErpSyncError> {
//!     let config = erp_sync::config::load_config("erp-sync.toml")?;
//!     println!("collection: {}", config.downstream.collection());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
