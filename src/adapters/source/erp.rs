//! HTTP client for the ERP transactions endpoint

use super::{FetchQuery, SourceClient};
use crate::config::SourceConfig;
use crate::domain::{ErpSyncError, Result, SourceError};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;

/// Longest error body kept in a [`SourceError::HttpStatus`] message
const MAX_ERROR_BODY_LEN: usize = 500;

/// ERP source client
///
/// One `GET` per fetch pass. Failures are not retried here; the fetch loop
/// tries again on its next tick.
///
/// # Example
///
/// ```no_run
/// use erp_sync::adapters::source::{ErpApiClient, FetchQuery, SourceClient};
/// use erp_sync::config::SourceConfig;
///
/// # async fn example() -> erp_sync::domain::Result<()> {
/// let config = SourceConfig::new("https://erp.example.com/api/transactions");
/// let client = ErpApiClient::new(&config)?;
/// let items = client.fetch(&FetchQuery::default()).await?;
/// println!("fetched {} items", items.len());
/// # Ok(())
/// # }
/// ```
pub struct ErpApiClient {
    client: Client,
    base_url: String,
}

impl ErpApiClient {
    /// Builds the client from the `[source]` section
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30));

        if !config.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            ErpSyncError::Configuration(format!("Failed to build source HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl SourceClient for ErpApiClient {
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Value>> {
        let params = query.to_params();
        tracing::debug!(url = %self.base_url, params = %query.describe(), "Requesting source records");

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(e.to_string())
                } else {
                    SourceError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY_LEN),
            }
            .into());
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(e.to_string())
            } else {
                SourceError::InvalidResponse(format!("body is not JSON: {e}"))
            }
        })?;

        match body {
            Value::Array(items) => Ok(items),
            other => Err(SourceError::InvalidResponse(format!(
                "expected a JSON array, got {}",
                match other {
                    Value::Object(_) => "an object",
                    Value::Null => "null",
                    _ => "a scalar",
                }
            ))
            .into()),
        }
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn test_new_keeps_base_url() {
        let config = SourceConfig::new("https://erp.example.com/api/transactions");
        let client = ErpApiClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "https://erp.example.com/api/transactions");
    }
}
