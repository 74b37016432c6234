//! Domain error types
//!
//! This module defines the error hierarchy for ERP Sync. Source and downstream
//! failures have their own enums so callers can tell a skipped fetch tick from
//! a delivery that needs a backoff retry. None of the variants carry third-party
//! error types.

use thiserror::Error;

/// Main ERP Sync error type
///
/// This is the primary error type used throughout the library. It wraps the
/// adapter-specific errors and adds the infrastructure failures shared by all
/// components.
#[derive(Debug, Error)]
pub enum ErpSyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Source system errors (fetch failed, retried on the next tick)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Downstream store errors (delivery failed, retried with backoff)
    #[error("Downstream error: {0}")]
    Downstream(#[from] DownstreamError),

    /// Persistent store errors
    #[error("Database error: {0}")]
    Database(String),

    /// A fetched record failed validation at the ingestion boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stored payload could not be turned into a downstream document
    #[error("Transform error: {0}")]
    Transform(String),

    /// A job state transition was requested from the wrong state
    #[error("Invalid job transition: {0}")]
    JobState(String),

    /// The worker refused to stop because a fetch pass is running
    #[error("Sync in progress: {0}")]
    SyncInProgress(String),

    /// Worker lifecycle errors (already running, join failures)
    #[error("Worker error: {0}")]
    Worker(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Errors raised while pulling records from the source system
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// The request exceeded the configured timeout
    #[error("Source request timed out: {0}")]
    Timeout(String),

    /// The source answered with a non-success status
    #[error("Source returned {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The body was not a JSON array of records
    #[error("Invalid source response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while talking to the downstream store
#[derive(Debug, Error)]
pub enum DownstreamError {
    /// The downstream store could not be reached
    #[error("Failed to connect to downstream store: {0}")]
    ConnectionFailed(String),

    /// Admin authentication was rejected or not configured
    #[error("Downstream authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The downstream store answered with a non-success status
    #[error("Downstream returned {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The response body could not be understood
    #[error("Invalid downstream response: {0}")]
    InvalidResponse(String),

    /// The request exceeded the configured timeout
    #[error("Downstream request timed out: {0}")]
    Timeout(String),
}

impl ErpSyncError {
    /// HTTP status carried by the error, if the failure came from an HTTP response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ErpSyncError::Source(SourceError::HttpStatus { status, .. }) => Some(*status),
            ErpSyncError::Downstream(DownstreamError::HttpStatus { status, .. }) => Some(*status),
            ErpSyncError::Downstream(DownstreamError::AuthenticationFailed(_)) => Some(401),
            _ => None,
        }
    }

    /// Whether this error means the source could not be read this tick
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, ErpSyncError::Source(_))
    }

    /// Whether this error is a delivery failure that the job queue retries
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            ErpSyncError::Downstream(_) | ErpSyncError::Transform(_)
        )
    }
}

impl From<std::io::Error> for ErpSyncError {
    fn from(err: std::io::Error) -> Self {
        ErpSyncError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ErpSyncError {
    fn from(err: serde_json::Error) -> Self {
        ErpSyncError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ErpSyncError {
    fn from(err: toml::de::Error) -> Self {
        ErpSyncError::Configuration(format!("TOML parsing error: {err}"))
    }
}

impl From<rusqlite::Error> for ErpSyncError {
    fn from(err: rusqlite::Error) -> Self {
        ErpSyncError::Database(err.to_string())
    }
}

impl From<tokio_postgres::Error> for ErpSyncError {
    fn from(err: tokio_postgres::Error) -> Self {
        ErpSyncError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ErpSyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        ErpSyncError::Worker(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ErpSyncError::Configuration("Invalid config".to_string());
        assert_eq!(error.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_source_error_conversion() {
        let source_error = SourceError::Unavailable("connection refused".to_string());
        let error: ErpSyncError = source_error.into();
        assert!(matches!(error, ErpSyncError::Source(_)));
        assert!(error.is_source_unavailable());
        assert!(!error.is_delivery_error());
    }

    #[test]
    fn test_downstream_status_code() {
        let error: ErpSyncError = DownstreamError::HttpStatus {
            status: 400,
            message: "Failed to create record.".to_string(),
        }
        .into();
        assert_eq!(error.status_code(), Some(400));
        assert!(error.is_delivery_error());
        assert!(error.to_string().contains("400"));
    }

    #[test]
    fn test_status_code_absent_for_transport_errors() {
        let error: ErpSyncError =
            DownstreamError::ConnectionFailed("connection reset".to_string()).into();
        assert_eq!(error.status_code(), None);

        let error = ErpSyncError::Transform("missing field".to_string());
        assert_eq!(error.status_code(), None);
        assert!(error.is_delivery_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ErpSyncError = io_error.into();
        assert!(matches!(error, ErpSyncError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: ErpSyncError = json_error.into();
        assert!(matches!(error, ErpSyncError::Serialization(_)));
    }
}
