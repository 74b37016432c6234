//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{ErpSyncConfig, StoreTarget};
use super::secret::secret_string;
use crate::domain::errors::ErpSyncError;
use crate::domain::result::Result;
use chrono::NaiveDate;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ErpSyncConfig
/// 4. Applies environment variable overrides (ERPSYNC_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `ErpSyncError::Configuration` if the file is missing or unreadable,
/// a referenced variable is unset, the TOML is malformed, an override does not
/// parse, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use erp_sync::config::loader::load_config;
///
/// let config = load_config("erp-sync.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ErpSyncConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ErpSyncError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ErpSyncError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying substitution, overrides and validation
pub fn parse_config(contents: &str) -> Result<ErpSyncConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: ErpSyncConfig = toml::from_str(&contents)
        .map_err(|e| ErpSyncError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ErpSyncError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched. Every missing variable is reported.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ErpSyncError::Configuration(format!("Invalid placeholder pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(ErpSyncError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ErpSyncError::Configuration(format!("Invalid value '{raw}' for {name}: {e}"))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using ERPSYNC_* prefix
///
/// Environment variables follow the pattern: ERPSYNC_<SECTION>_<KEY>
/// For example: ERPSYNC_SOURCE_BASE_URL, ERPSYNC_SYNC_FROM_DATE
fn apply_env_overrides(config: &mut ErpSyncConfig) -> Result<()> {
    if let Ok(val) = std::env::var("ERPSYNC_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Source overrides
    if let Ok(val) = std::env::var("ERPSYNC_SOURCE_BASE_URL") {
        config.source.base_url = val;
    }
    if let Ok(val) = std::env::var("ERPSYNC_SOURCE_TXN_TYPE") {
        config.source.txn_type = if val.is_empty() { None } else { Some(val) };
    }
    if let Some(timeout) = env_parsed("ERPSYNC_SOURCE_TIMEOUT_SECONDS")? {
        config.source.timeout_seconds = timeout;
    }

    // Downstream overrides
    if let Ok(val) = std::env::var("ERPSYNC_DOWNSTREAM_BASE_URL") {
        config.downstream.base_url = val;
    }
    if let Ok(val) = std::env::var("ERPSYNC_DOWNSTREAM_PLANT_CODE") {
        config.downstream.plant_code = val;
    }
    if let Ok(val) = std::env::var("ERPSYNC_DOWNSTREAM_ADMIN_EMAIL") {
        config.downstream.admin_email = Some(val);
    }
    if let Ok(val) = std::env::var("ERPSYNC_DOWNSTREAM_ADMIN_PASSWORD") {
        config.downstream.admin_password = Some(secret_string(val));
    }
    if let Some(timeout) = env_parsed("ERPSYNC_DOWNSTREAM_TIMEOUT_SECONDS")? {
        config.downstream.timeout_seconds = timeout;
    }

    // Sync overrides
    if let Some(minutes) = env_parsed("ERPSYNC_SYNC_FETCH_INTERVAL_MINUTES")? {
        config.sync.fetch_interval_minutes = minutes;
    }
    if let Some(date) = env_parsed::<NaiveDate>("ERPSYNC_SYNC_FROM_DATE")? {
        config.sync.from_date = Some(date);
    }
    if let Some(days) = env_parsed("ERPSYNC_SYNC_DAYS_BACK")? {
        config.sync.days_back = Some(days);
    }
    if let Some(run) = env_parsed("ERPSYNC_SYNC_RUN_ON_STARTUP")? {
        config.sync.run_on_startup = run;
    }

    // Retry overrides
    if let Some(retries) = env_parsed("ERPSYNC_RETRY_MAX_RETRIES")? {
        config.retry.max_retries = retries;
    }

    // Store overrides
    if let Ok(val) = std::env::var("ERPSYNC_STORE_TARGET") {
        config.store_target = match val.to_lowercase().as_str() {
            "sqlite" => StoreTarget::Sqlite,
            "postgresql" => StoreTarget::PostgreSQL,
            other => {
                return Err(ErpSyncError::Configuration(format!(
                    "Invalid value '{other}' for ERPSYNC_STORE_TARGET: expected sqlite or postgresql"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("ERPSYNC_SQLITE_PATH") {
        config.sqlite.path = val;
    }
    if let Some(ref mut pg) = config.postgresql {
        if let Ok(val) = std::env::var("ERPSYNC_POSTGRESQL_CONNECTION_STRING") {
            pg.connection_string = secret_string(val);
        }
        if let Some(max) = env_parsed("ERPSYNC_POSTGRESQL_MAX_CONNECTIONS")? {
            pg.max_connections = max;
        }
    }

    // Logging overrides
    if let Some(enabled) = env_parsed("ERPSYNC_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = enabled;
    }
    if let Ok(val) = std::env::var("ERPSYNC_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("ERPSYNC_LOADER_TEST_VAR", "test_value");
        let input = "password = \"${ERPSYNC_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("ERPSYNC_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_reports_all_missing() {
        std::env::remove_var("ERPSYNC_LOADER_MISSING_A");
        std::env::remove_var("ERPSYNC_LOADER_MISSING_B");
        let input = "a = \"${ERPSYNC_LOADER_MISSING_A}\"\nb = \"${ERPSYNC_LOADER_MISSING_B}\"";
        let err = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err.contains("ERPSYNC_LOADER_MISSING_A"));
        assert!(err.contains("ERPSYNC_LOADER_MISSING_B"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        let input = "# password = \"${ERPSYNC_LOADER_NEVER_SET}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(matches!(result, Err(ErpSyncError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
environment = "staging"

[application]
log_level = "debug"

[source]
base_url = "https://erp.example.com/api/transactions"
txn_type = "BOM"

[downstream]
base_url = "https://pb.example.com"
plant_code = "P100"
admin_email = "admin@example.com"
admin_password = "secret"

[sync]
fetch_interval_minutes = 30
days_back = 30
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.downstream.collection(), "P100_erpConsolidateData");
        assert_eq!(config.sync.fetch_interval_minutes, 30);
        assert_eq!(config.sync.days_back, Some(30));
    }

    #[test]
    fn test_parse_config_rejects_malformed_toml() {
        let result = parse_config("[source\nbase_url = 1");
        assert!(matches!(result, Err(ErpSyncError::Configuration(_))));
    }
}
