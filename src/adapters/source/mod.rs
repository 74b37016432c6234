//! ERP source API integration
//!
//! The fetch pass talks to the source through [`SourceClient`] so tests can
//! substitute a canned result set.

pub mod erp;

pub use erp::ErpApiClient;

use crate::domain::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

/// Date format of the `fromDate` query parameter
pub const FROM_DATE_FORMAT: &str = "%Y-%m-%d";

/// Filters sent with a fetch request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Transaction type, sent as `txnType`
    pub txn_type: Option<String>,
    /// Lower bound of the window, sent as `fromDate`
    pub from_date: Option<NaiveDate>,
}

impl FetchQuery {
    /// Query parameters in the order they are sent
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(txn_type) = &self.txn_type {
            params.push(("txnType", txn_type.clone()));
        }
        if let Some(date) = self.from_date {
            params.push(("fromDate", date.format(FROM_DATE_FORMAT).to_string()));
        }
        params
    }

    /// Human-readable form for logs and status output, e.g. `txnType=BOM&fromDate=2024-01-01`
    pub fn describe(&self) -> String {
        self.to_params()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Read side of the ERP system
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetches the full result set matching `query`
    ///
    /// # Errors
    ///
    /// Returns [`ErpSyncError::Source`](crate::domain::ErpSyncError::Source)
    /// when the source is unreachable, times out, answers with a non-success
    /// status or returns something other than a JSON array.
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Value>>;

    /// Endpoint URL, for status reporting
    fn endpoint(&self) -> &str;
}
