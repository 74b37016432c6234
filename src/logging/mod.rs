//! Logging and observability
//!
//! Structured logging built on `tracing`:
//! - Human-readable console output
//! - Optional JSON log files with daily or hourly rotation
//! - `RUST_LOG` override of the configured level
//! - Macros that give every loop event the same field names
//!
//! # Example
//!
//! ```no_run
//! use erp_sync::logging::init_logging;
//! use erp_sync::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(loop_name = "fetch", "Worker started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log the completion of a fetch-and-store pass
///
/// # Example
///
/// ```no_run
/// use erp_sync::log_fetch_complete;
/// use std::time::Duration;
///
/// log_fetch_complete!(120, 118, 7, 2, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_fetch_complete {
    ($fetched:expr, $stored:expr, $queued:expr, $invalid:expr, $duration:expr) => {{
        tracing::info!(
            fetched = $fetched,
            stored = $stored,
            queued = $queued,
            invalid = $invalid,
            duration_ms = $duration.as_millis() as u64,
            "Fetch pass completed"
        );
    }};
}

/// Log the outcome of one delivery attempt
///
/// # Example
///
/// ```no_run
/// use erp_sync::log_delivery_outcome;
/// use erp_sync::domain::JobId;
///
/// log_delivery_outcome!(JobId::new(7), "SO-1-10-P-7", 200);
/// ```
#[macro_export]
macro_rules! log_delivery_outcome {
    ($job_id:expr, $natural_key:expr, $status:expr) => {{
        if (200..300).contains(&$status) {
            tracing::info!(
                job_id = %$job_id,
                natural_key = %$natural_key,
                response_code = $status,
                "Job delivered"
            );
        } else {
            tracing::warn!(
                job_id = %$job_id,
                natural_key = %$natural_key,
                response_code = $status,
                "Job delivery failed"
            );
        }
    }};
}

/// Log a delivery failure that was rescheduled or exhausted
///
/// # Example
///
/// ```no_run
/// use erp_sync::log_retry_scheduled;
/// use erp_sync::domain::{JobId, JobStatus};
///
/// log_retry_scheduled!(JobId::new(7), 2, JobStatus::Queued, "connection refused");
/// ```
#[macro_export]
macro_rules! log_retry_scheduled {
    ($job_id:expr, $retry_count:expr, $status:expr, $reason:expr) => {{
        tracing::warn!(
            job_id = %$job_id,
            retry_count = $retry_count,
            status = %$status,
            reason = %$reason,
            "Delivery retry scheduled"
        );
    }};
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use erp_sync::log_error_with_context;
/// use erp_sync::domain::ErpSyncError;
///
/// let error = ErpSyncError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {{
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    }};
}
