//! Persistent store abstraction
//!
//! The loops talk to the store through the traits in [`traits`]; the
//! [`factory`] picks SQLite or PostgreSQL from configuration.

pub mod factory;
pub mod traits;

pub use factory::create_sync_store;
pub use traits::{DeliveryLog, IngestionStore, JobQueue, SyncStore};
