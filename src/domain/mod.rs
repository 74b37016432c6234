//! Domain models and types for ERP Sync.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`RecordId`], [`JobId`], [`NaturalKey`])
//! - **The validated source record** ([`ErpRecord`]) and its stored form ([`RawRecord`])
//! - **Queue models** ([`Job`], [`JobStatus`], [`QueueDepth`])
//! - **Delivery audit entries** ([`DeliveryLogEntry`])
//! - **Error types** ([`ErpSyncError`], [`SourceError`], [`DownstreamError`])
//! - **Result type alias** ([`Result`])
//!
//! # Validation at the boundary
//!
//! ```rust
//! use erp_sync::domain::ErpRecord;
//! use serde_json::json;
//!
//! let item = json!({
//!     "CUST_ORDER_ID": "SO-1",
//!     "CUST_ORDER_LINE_NO": "10",
//!     "BOM_PART_ID": "P-7",
//!     "BOM_WORKORDER_BASE_ID": "WO-1",
//!     "BOM_WORKORDER_SUB_ID": "0"
//! });
//! let record = ErpRecord::from_source(&item).unwrap();
//! assert_eq!(record.natural_key().unwrap().as_str(), "SO-1-10-P-7");
//! ```

pub mod delivery;
pub mod errors;
pub mod ids;
pub mod job;
pub mod record;
pub mod result;
pub mod values;

// Re-export commonly used types for convenience
pub use delivery::DeliveryLogEntry;
pub use errors::{DownstreamError, ErpSyncError, SourceError};
pub use ids::{JobId, NaturalKey, RecordId};
pub use job::{ClaimedJob, Job, JobStatus, QueueDepth};
pub use record::{CompositeKey, ErpRecord, RawRecord, UpsertOutcome};
pub use result::Result;
