//! Sync store factory
//!
//! Builds the configured backend and makes sure its schema exists.

use crate::adapters::database::traits::SyncStore;
use crate::adapters::postgresql::{PostgreSQLClient, PostgreSQLStore};
use crate::adapters::sqlite::SqliteStore;
use crate::config::schema::{ErpSyncConfig, StoreTarget};
use crate::domain::{ErpSyncError, Result};
use std::sync::Arc;

/// Path that selects a private in-memory SQLite database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Create the sync store selected by `store_target`
///
/// The schema is created if missing, so a fresh database is ready to use.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened or its schema cannot be
/// created.
pub async fn create_sync_store(config: &ErpSyncConfig) -> Result<Arc<dyn SyncStore>> {
    let store: Arc<dyn SyncStore> = match config.store_target {
        StoreTarget::Sqlite => {
            let path = config.sqlite.path.clone();
            tracing::info!(path = %path, "Opening SQLite sync store");

            let store = tokio::task::spawn_blocking(move || {
                if path == IN_MEMORY_PATH {
                    SqliteStore::open_in_memory()
                } else {
                    SqliteStore::open(&path)
                }
            })
            .await??;
            Arc::new(store)
        }
        StoreTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                ErpSyncError::Configuration(
                    "postgresql configuration is required when store_target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL sync store");
            let client = PostgreSQLClient::new(pg_config.clone())?;
            tracing::debug!(target_db = %client.connection_string_safe(), "PostgreSQL pool created");
            Arc::new(PostgreSQLStore::new(client))
        }
    };

    store.ensure_schema().await?;
    tracing::info!(backend = store.backend_name(), "Sync store ready");
    Ok(store)
}
