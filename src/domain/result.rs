//! Result type alias for ERP Sync

use super::errors::ErpSyncError;

/// Result type alias for ERP Sync operations
///
/// # Examples
///
/// ```
/// use erp_sync::domain::result::Result;
/// use erp_sync::domain::errors::ErpSyncError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ErpSyncError::Validation("missing CUST_ORDER_ID".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ErpSyncError>;
