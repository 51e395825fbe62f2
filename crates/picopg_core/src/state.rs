//! Application state management.
//!
//! [`PicoState`] owns the local storage, the saved profiles and a tokio
//! runtime. Front ends call its blocking methods; each database operation
//! opens its own pool, runs, and closes it again.

use crate::config::AppConfig;
use crate::error::PicoError;
use crate::models::{ColumnDetail, ConnectionOptions, ConnectionProfile, DatabaseInfo, QueryResult, TableInfo};
use crate::services::schema::{DEFAULT_PREVIEW_LIMIT, DEFAULT_SCHEMA};
use crate::services::{
    ConnectionPool, ConnectionService, ConnectionTestResult, LocalStorage, PooledConnection,
    ProfileStore, QueryService, SchemaService,
};

use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Central application state.
pub struct PicoState {
    config: AppConfig,
    storage: Arc<LocalStorage>,
    profiles: ProfileStore,
    /// Tokio runtime for async database operations
    tokio_runtime: tokio::runtime::Runtime,
}

impl PicoState {
    /// Create state from the environment.
    pub fn new() -> Result<Self, PicoError> {
        Self::with_config(AppConfig::from_env()?)
    }

    /// Create state with a custom data directory and default options.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, PicoError> {
        Self::with_config(AppConfig::default().with_data_dir(data_dir))
    }

    /// Create state from an explicit configuration.
    pub fn with_config(config: AppConfig) -> Result<Self, PicoError> {
        crate::services::storage::init_data_dir(&config.data_dir)?;

        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| PicoError::internal(format!("Failed to create tokio runtime: {e}")))?;

        let storage = Arc::new(LocalStorage::open(config.data_dir.clone())?);
        let profiles = ProfileStore::new(storage.clone());

        tracing::info!(data_dir = %config.data_dir.display(), "PicoState initialized");

        Ok(Self { config, storage, profiles, tokio_runtime })
    }

    // ========== Profiles ==========

    /// All saved profiles, in saved order.
    pub fn profiles(&self) -> Result<Vec<ConnectionProfile>, PicoError> {
        self.profiles.list()
    }

    /// Look up a saved profile by id or name.
    pub fn profile(&self, key: &str) -> Result<ConnectionProfile, PicoError> {
        self.profiles.find(key)?.ok_or_else(|| PicoError::profile_not_found(key))
    }

    /// Save a new profile.
    ///
    /// With `verify`, the server must accept a connection first; nothing is
    /// saved otherwise.
    pub fn create_profile(
        &self,
        mut profile: ConnectionProfile,
        verify: bool,
    ) -> Result<ConnectionProfile, PicoError> {
        profile.validate()?;

        if verify {
            let options = self.config.connection.clone();
            self.block_on(async {
                let pool = ConnectionPool::open(&profile, &options).await?;
                pool.close();
                Ok::<_, PicoError>(())
            })
            .inspect_err(|e| {
                tracing::warn!(name = %profile.name, error = %e, "Connection check failed, not saving");
            })?;
            profile.touch_connected(Utc::now());
        }

        self.profiles.add(profile.clone())?;
        tracing::info!(connection_id = %profile.id, name = %profile.name, "Connection saved");
        Ok(profile)
    }

    /// Replace a saved profile (matched by id).
    pub fn update_profile(&self, mut profile: ConnectionProfile) -> Result<ConnectionProfile, PicoError> {
        profile.validate()?;
        profile.updated_at = Utc::now();
        self.profiles.update(profile.clone())?;
        tracing::info!(connection_id = %profile.id, "Connection updated");
        Ok(profile)
    }

    /// Delete a saved profile by id or name.
    pub fn delete_profile(&self, key: &str) -> Result<ConnectionProfile, PicoError> {
        let profile = self.profile(key)?;
        self.profiles.delete(profile.id)?;
        tracing::info!(connection_id = %profile.id, "Connection deleted");
        Ok(profile)
    }

    // ========== Database operations ==========

    /// Test a saved profile; on success its last-connected time is updated.
    pub fn test_connection(&self, key: &str) -> Result<ConnectionTestResult, PicoError> {
        let profile = self.profile(key)?;
        let result = self.block_on(ConnectionService::test_connection(&profile, &self.config.connection));
        if result.success {
            self.record_connected(profile);
        }
        Ok(result)
    }

    /// Run ad-hoc SQL on a saved profile.
    pub fn run_query(&self, key: &str, sql: &str) -> Result<QueryResult, PicoError> {
        self.run_on_profile(key, "query", true, |conn| async move {
            QueryService::execute(&conn, sql).await
        })
    }

    /// List user tables with their columns.
    pub fn fetch_tables(&self, key: &str) -> Result<Vec<TableInfo>, PicoError> {
        self.run_on_profile(key, "tables", true, |conn| async move {
            SchemaService::list_tables(&conn).await
        })
    }

    /// List databases on the profile's server.
    pub fn fetch_databases(&self, key: &str) -> Result<Vec<DatabaseInfo>, PicoError> {
        self.run_on_profile(key, "databases", true, |conn| async move {
            SchemaService::list_databases(&conn).await
        })
    }

    /// Columns of one table; `schema` defaults to `public`.
    pub fn fetch_columns(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnDetail>, PicoError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        self.run_on_profile(key, "columns", false, |conn| async move {
            SchemaService::table_columns(&conn, schema, table).await
        })
    }

    /// First rows of one table; `schema` defaults to `public` and `limit` to 100.
    pub fn preview_table(
        &self,
        key: &str,
        table: &str,
        schema: Option<&str>,
        limit: Option<u32>,
    ) -> Result<QueryResult, PicoError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let limit = limit.unwrap_or(DEFAULT_PREVIEW_LIMIT);
        self.run_on_profile(key, "preview", true, |conn| async move {
            SchemaService::preview_table(&conn, schema, table, limit).await
        })
    }

    fn run_on_profile<T, F, Fut>(
        &self,
        key: &str,
        operation: &'static str,
        touch: bool,
        f: F,
    ) -> Result<T, PicoError>
    where
        F: FnOnce(PooledConnection) -> Fut,
        Fut: Future<Output = Result<T, PicoError>>,
    {
        let profile = self.profile(key)?;
        tracing::debug!(connection_id = %profile.id, operation, "Running operation");

        match self.block_on(with_connection(&profile, &self.config.connection, f)) {
            Ok(value) => {
                if touch {
                    self.record_connected(profile);
                }
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(connection_id = %profile.id, operation, error = %e, "Operation failed");
                Err(e)
            }
        }
    }

    fn record_connected(&self, mut profile: ConnectionProfile) {
        profile.touch_connected(Utc::now());
        if let Err(e) = self.profiles.update(profile) {
            tracing::warn!(error = %e, "Failed to record last connection time");
        }
    }

    // ========== Accessors ==========

    /// The active configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the local storage service.
    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get a handle to the tokio runtime.
    pub fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.tokio_runtime
    }

    /// Block on a future using the tokio runtime.
    ///
    /// Must not be called from inside the runtime.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.tokio_runtime.block_on(future)
    }
}

/// Open a pool for `profile`, hand one connection to `f`, then close the pool.
async fn with_connection<T, F, Fut>(
    profile: &ConnectionProfile,
    options: &ConnectionOptions,
    f: F,
) -> Result<T, PicoError>
where
    F: FnOnce(PooledConnection) -> Fut,
    Fut: Future<Output = Result<T, PicoError>>,
{
    let pool = ConnectionPool::open(profile, options).await?;
    let result = match pool.get().await {
        Ok(conn) => f(conn).await,
        Err(e) => Err(e),
    };
    pool.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unreachable_profile(name: &str) -> ConnectionProfile {
        let mut profile = ConnectionProfile::new(name, "127.0.0.1", "app", "postgres");
        profile.port = 1;
        profile.password = "secret".to_string();
        profile
    }

    fn state(dir: &Path) -> PicoState {
        let mut config = AppConfig::default().with_data_dir(dir);
        config.connection.connect_timeout_secs = 2;
        PicoState::with_config(config).unwrap()
    }

    #[test]
    fn test_profile_lifecycle() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        assert!(state.profiles().unwrap().is_empty());

        let saved = state.create_profile(unreachable_profile("Local"), false).unwrap();
        assert!(saved.last_connected.is_none());
        assert_eq!(state.profile("local").unwrap().id, saved.id);

        let mut changed = saved.clone();
        changed.host = "db.internal".to_string();
        let updated = state.update_profile(changed).unwrap();
        assert!(updated.updated_at >= saved.updated_at);
        assert_eq!(state.profile(&saved.id.to_string()).unwrap().host, "db.internal");

        state.delete_profile("Local").unwrap();
        assert!(matches!(state.profile("Local"), Err(PicoError::ProfileNotFound { .. })));
    }

    #[test]
    fn test_profiles_survive_restart() {
        let dir = tempdir().unwrap();
        let id = {
            let state = state(dir.path());
            state.create_profile(unreachable_profile("Kept"), false).unwrap().id
        };
        let state = state(dir.path());
        let profile = state.profile("Kept").unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.password, "secret");
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        let mut profile = unreachable_profile("Bad");
        profile.username.clear();
        assert!(matches!(state.create_profile(profile, false), Err(PicoError::Validation { .. })));
        assert!(state.profiles().unwrap().is_empty());
    }

    #[test]
    fn test_verified_create_fails_without_server() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        let err = state.create_profile(unreachable_profile("Down"), true).unwrap_err();
        assert!(err.is_connection_error());
        assert!(state.profiles().unwrap().is_empty());
    }

    #[test]
    fn test_failed_test_does_not_touch() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state.create_profile(unreachable_profile("Down"), false).unwrap();

        let result = state.test_connection("Down").unwrap();
        assert!(!result.success);
        assert!(state.profile("Down").unwrap().last_connected.is_none());
    }

    #[test]
    fn test_operations_on_unknown_profile() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        assert!(matches!(state.test_connection("nope"), Err(PicoError::ProfileNotFound { .. })));
        assert!(matches!(state.run_query("nope", "SELECT 1"), Err(PicoError::ProfileNotFound { .. })));
        assert!(matches!(state.delete_profile("nope"), Err(PicoError::ProfileNotFound { .. })));
        assert!(matches!(
            state.preview_table("nope", "users", None, None),
            Err(PicoError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn test_failed_query_reports_connection_error() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state.create_profile(unreachable_profile("Down"), false).unwrap();
        let err = state.run_query("Down", "SELECT 1").unwrap_err();
        assert!(err.is_connection_error());
        assert!(state.profile("Down").unwrap().last_connected.is_none());
    }
}
