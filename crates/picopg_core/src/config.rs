//! Application configuration.
//!
//! Built from defaults, then environment variables, then whatever the front
//! end overrides (command-line flags).

use std::path::PathBuf;

use crate::error::PicoError;
use crate::models::ConnectionOptions;

/// Overrides the data directory.
pub const DATA_DIR_ENV: &str = "PICOPG_DATA_DIR";
/// Log filter directive, same syntax as `RUST_LOG`.
pub const LOG_ENV: &str = "PICOPG_LOG";
/// Connect timeout in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "PICOPG_CONNECT_TIMEOUT";
/// Statement timeout in seconds; `0` disables it.
pub const STATEMENT_TIMEOUT_ENV: &str = "PICOPG_STATEMENT_TIMEOUT";
/// `application_name` reported to the server.
pub const APPLICATION_NAME_ENV: &str = "PICOPG_APPLICATION_NAME";

/// Runtime configuration shared by every operation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `picopg.db` and `logs/`.
    pub data_dir: PathBuf,
    /// Explicit log filter. `None` defers to the environment.
    pub log_filter: Option<String>,
    /// Options applied to every database connection.
    pub connection: ConnectionOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::services::storage::default_data_dir(),
            log_filter: None,
            connection: ConnectionOptions::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, PicoError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PicoError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        config.log_filter = get(LOG_ENV);

        if let Some(value) = get(CONNECT_TIMEOUT_ENV) {
            let secs = parse_secs(CONNECT_TIMEOUT_ENV, &value)?;
            if secs == 0 {
                return Err(PicoError::config(format!("{CONNECT_TIMEOUT_ENV} must be at least 1")));
            }
            config.connection.connect_timeout_secs = secs;
        }
        if let Some(value) = get(STATEMENT_TIMEOUT_ENV) {
            let secs = parse_secs(STATEMENT_TIMEOUT_ENV, &value)?;
            config.connection.statement_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(name) = get(APPLICATION_NAME_ENV) {
            config.connection.application_name = name;
        }

        Ok(config)
    }

    /// Replace the data directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Replace the log filter.
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Directory for rolling log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u32, PicoError> {
    value
        .parse::<u32>()
        .map_err(|_| PicoError::config(format!("{key} must be a whole number of seconds, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.connection.statement_timeout_secs, None);
        assert_eq!(config.connection.application_name, "picopg");
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (DATA_DIR_ENV, "/tmp/picopg-test"),
            (LOG_ENV, "picopg_core=trace"),
            (CONNECT_TIMEOUT_ENV, "3"),
            (STATEMENT_TIMEOUT_ENV, "30"),
            (APPLICATION_NAME_ENV, "reports"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/picopg-test"));
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/picopg-test/logs"));
        assert_eq!(config.log_filter.as_deref(), Some("picopg_core=trace"));
        assert_eq!(config.connection.connect_timeout_secs, 3);
        assert_eq!(config.connection.statement_timeout_secs, Some(30));
        assert_eq!(config.connection.application_name, "reports");
    }

    #[test]
    fn test_zero_statement_timeout_disables() {
        let config = AppConfig::from_lookup(lookup(&[(STATEMENT_TIMEOUT_ENV, "0")])).unwrap();
        assert_eq!(config.connection.statement_timeout_secs, None);
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        let err = AppConfig::from_lookup(lookup(&[(CONNECT_TIMEOUT_ENV, "soon")])).unwrap_err();
        assert!(matches!(err, PicoError::Config { .. }));
        let err = AppConfig::from_lookup(lookup(&[(CONNECT_TIMEOUT_ENV, "0")])).unwrap_err();
        assert!(matches!(err, PicoError::Config { .. }));
        let err = AppConfig::from_lookup(lookup(&[(STATEMENT_TIMEOUT_ENV, "-1")])).unwrap_err();
        assert!(matches!(err, PicoError::Config { .. }));
    }

    #[test]
    fn test_builder_overrides() {
        let config = AppConfig::default().with_data_dir("/data").with_log_filter("warn");
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
    }
}
