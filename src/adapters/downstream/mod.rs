//! Downstream record store integration
//!
//! Delivery is an upsert by natural key built from three primitives: find,
//! create and update. [`DownstreamStore`] is the seam the delivery pass uses;
//! [`PocketBaseClient`] implements it over the PocketBase REST API.

pub mod pocketbase;

pub use pocketbase::PocketBaseClient;

use crate::domain::{CompositeKey, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Status and body of a successful write, kept for the delivery log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamResponse {
    pub status: u16,
    pub body: String,
}

/// Write side of the downstream store
#[async_trait]
pub trait DownstreamStore: Send + Sync {
    /// Obtains (or refreshes) credentials for subsequent calls
    async fn authenticate(&self) -> Result<()>;

    /// Id of the record carrying `key`, if one exists
    async fn find_by_key(&self, key: &CompositeKey) -> Result<Option<String>>;

    /// Creates a record
    ///
    /// # Errors
    ///
    /// Non-success responses are returned as
    /// [`DownstreamError::HttpStatus`](crate::domain::DownstreamError::HttpStatus).
    async fn create(&self, document: &Value) -> Result<DownstreamResponse>;

    /// Replaces the fields of record `id`
    async fn update(&self, id: &str, document: &Value) -> Result<DownstreamResponse>;
}
