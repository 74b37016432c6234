//! PostgreSQL backend
//!
//! Holds the same three tables as the SQLite backend, using `JSONB` payloads
//! and `FOR UPDATE SKIP LOCKED` claims so several workers can share a queue.

pub mod client;
pub mod store;

pub use client::PostgreSQLClient;
pub use store::PostgreSQLStore;
