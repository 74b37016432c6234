//! PocketBase REST client
//!
//! Records live in the `{plant_code}_{collection_suffix}` collection. Admin
//! credentials are exchanged for a bearer token which is refreshed once when a
//! call comes back `401`.

use super::{DownstreamResponse, DownstreamStore};
use crate::config::{DownstreamConfig, SecretString};
use crate::domain::{CompositeKey, DownstreamError, ErpSyncError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

const AUTH_PATH: [&str; 4] = ["api", "collections", "_superusers", "auth-with-password"];

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: String,
}

/// Superuser login; the password stays wrapped until the auth body is built
#[derive(Debug, Clone)]
struct AdminCredentials {
    identity: String,
    password: SecretString,
}

/// PocketBase-compatible downstream store
pub struct PocketBaseClient {
    client: Client,
    records_url: Url,
    auth_url: Url,
    credentials: Option<AdminCredentials>,
    token: RwLock<Option<String>>,
}

impl PocketBaseClient {
    /// Builds the client from the `[downstream]` section
    ///
    /// No request is made; call [`DownstreamStore::authenticate`] to obtain a
    /// token up front.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL cannot hold a path or the
    /// HTTP client cannot be built.
    pub fn new(config: &DownstreamConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)));

        if !config.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            ErpSyncError::Configuration(format!("Failed to build downstream HTTP client: {e}"))
        })?;

        let collection = config.collection();
        let records_url = api_url(
            &config.base_url,
            &["api", "collections", collection.as_str(), "records"],
        )?;
        let auth_url = api_url(&config.base_url, &AUTH_PATH)?;

        let credentials = match (&config.admin_email, &config.admin_password) {
            (Some(email), Some(password)) => Some(AdminCredentials {
                identity: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            records_url,
            auth_url,
            credentials,
            token: RwLock::new(None),
        })
    }

    /// URL of the collection's records endpoint
    pub fn records_url(&self) -> &Url {
        &self.records_url
    }

    fn record_url(&self, id: &str) -> Result<Url> {
        let mut url = self.records_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ErpSyncError::Configuration("downstream.base_url cannot be a base".to_string())
            })?
            .push(id);
        Ok(url)
    }

    /// Sends the request built by `build`, re-authenticating once on `401`
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send_once(&build).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.credentials.is_some() {
            tracing::debug!("Downstream token rejected, re-authenticating");
            self.authenticate().await?;
            return self.send_once(&build).await;
        }

        Ok(response)
    }

    async fn send_once<F>(&self, build: &F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut request = build(&self.client);
        if let Some(token) = self.token.read().await.as_deref() {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(transport_error)
    }

    async fn write(&self, response: Response) -> Result<DownstreamResponse> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(DownstreamError::HttpStatus {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        Ok(DownstreamResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DownstreamStore for PocketBaseClient {
    async fn authenticate(&self) -> Result<()> {
        let Some(credentials) = &self.credentials else {
            tracing::warn!("No downstream admin credentials configured, sending unauthenticated requests");
            return Ok(());
        };

        let response = self
            .client
            .post(self.auth_url.clone())
            .json(&serde_json::json!({
                "identity": credentials.identity,
                "password": credentials.password.expose_secret().as_str(),
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamError::AuthenticationFailed(format!(
                "admin login returned {}: {}",
                status.as_u16(),
                body
            ))
            .into());
        }

        let auth: AuthResponse = response.json().await.map_err(|e| {
            DownstreamError::InvalidResponse(format!("auth response has no token: {e}"))
        })?;

        *self.token.write().await = Some(auth.token);
        tracing::info!("Authenticated with downstream store");
        Ok(())
    }

    async fn find_by_key(&self, key: &CompositeKey) -> Result<Option<String>> {
        let filter = key_filter(key);

        let response = self
            .send(|client| {
                client
                    .get(self.records_url.clone())
                    .query(&[("filter", filter.as_str()), ("perPage", "1")])
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DownstreamError::HttpStatus {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        let list: ListResponse = response.json().await.map_err(|e| {
            DownstreamError::InvalidResponse(format!("unexpected list response: {e}"))
        })?;

        Ok(list.items.into_iter().next().map(|item| item.id))
    }

    async fn create(&self, document: &Value) -> Result<DownstreamResponse> {
        let response = self
            .send(|client| client.post(self.records_url.clone()).json(document))
            .await?;
        self.write(response).await
    }

    async fn update(&self, id: &str, document: &Value) -> Result<DownstreamResponse> {
        let url = self.record_url(id)?;
        let response = self
            .send(|client| client.patch(url.clone()).json(document))
            .await?;
        self.write(response).await
    }
}

fn api_url(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| {
        ErpSyncError::Configuration(format!("Invalid downstream.base_url '{base_url}': {e}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            ErpSyncError::Configuration(format!("downstream.base_url '{base_url}' cannot be a base"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Filter expression matching all three natural-key fields
fn key_filter(key: &CompositeKey) -> String {
    key.fields()
        .iter()
        .map(|(field, value)| format!("{field}=\"{}\"", escape_filter_value(value)))
        .collect::<Vec<_>>()
        .join(" && ")
}

fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn transport_error(e: reqwest::Error) -> ErpSyncError {
    if e.is_timeout() {
        DownstreamError::Timeout(e.to_string()).into()
    } else {
        DownstreamError::ConnectionFailed(e.to_string()).into()
    }
}
