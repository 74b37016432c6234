//! SQLite persistent store
//!
//! The default backend: a single database file holding the ingestion store,
//! job queue and delivery log.

pub mod schema;
pub mod store;

pub use store::SqliteStore;
