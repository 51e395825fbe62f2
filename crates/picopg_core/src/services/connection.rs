//! Database connections with deadpool-postgres.
//!
//! Every database operation opens its own [`ConnectionPool`] from a saved
//! profile, uses it, and closes it again. Nothing is reused between
//! operations.

use crate::error::PicoError;
use crate::models::{ConnectionOptions, ConnectionProfile, SslMode};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use uuid::Uuid;

/// Pool size used for a single operation.
const OPERATION_POOL_SIZE: usize = 1;

/// A short-lived pool of connections for one profile.
pub struct ConnectionPool {
    id: Uuid,
    pool: Pool,
}

impl ConnectionPool {
    /// Open a pool for `profile` and validate it with `SELECT 1`.
    pub async fn open(
        profile: &ConnectionProfile,
        options: &ConnectionOptions,
    ) -> Result<Self, PicoError> {
        let connect_timeout = Duration::from_secs(u64::from(options.connect_timeout_secs.max(1)));

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&profile.host);
        pg_config.port(profile.port);
        pg_config.dbname(&profile.database);
        pg_config.user(&profile.username);
        if !profile.password.is_empty() {
            pg_config.password(&profile.password);
        }
        pg_config.application_name(&options.application_name);
        pg_config.connect_timeout(connect_timeout);
        if let Some(secs) = options.statement_timeout_secs {
            pg_config.options(&format!("-c statement_timeout={}s", secs));
        }

        let ssl_mode = profile.effective_ssl_mode();
        pg_config.ssl_mode(match ssl_mode {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                tokio_postgres::config::SslMode::Require
            }
        });

        let manager_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
        let manager = match ssl_mode {
            SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
            mode => Manager::from_config(pg_config, tls_connector(mode)?, manager_config),
        };

        let pool = Pool::builder(manager)
            .max_size(OPERATION_POOL_SIZE)
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PicoError::connection(format!("Failed to create pool: {e}")))?;

        let client = pool.get().await?;
        client.execute("SELECT 1", &[]).await?;
        drop(client);

        tracing::debug!(
            connection_id = %profile.id,
            host = %profile.host,
            database = %profile.database,
            ssl_mode = %ssl_mode,
            "Connection pool opened"
        );

        Ok(Self { id: profile.id, pool })
    }

    /// Acquire a connection from the pool.
    pub async fn get(&self) -> Result<PooledConnection, PicoError> {
        let client = self.pool.get().await?;
        Ok(PooledConnection { client, connection_id: self.id })
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.pool.close();
        tracing::debug!(connection_id = %self.id, "Connection pool closed");
    }
}

fn tls_connector(mode: SslMode) -> Result<MakeTlsConnector, PicoError> {
    let mut builder = TlsConnector::builder();
    match mode {
        // libpq semantics: prefer/require encrypt but do not verify.
        SslMode::Prefer | SslMode::Require => {
            builder.danger_accept_invalid_certs(true);
        }
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyFull | SslMode::Disable => {}
    }
    let connector = builder
        .build()
        .map_err(|e| PicoError::ssl_with_source("Failed to create TLS connector", e))?;
    Ok(MakeTlsConnector::new(connector))
}

/// A connection acquired from the pool.
///
/// Returns to the pool when dropped.
pub struct PooledConnection {
    client: deadpool_postgres::Client,
    connection_id: Uuid,
}

impl PooledConnection {
    /// Get the connection ID this pooled connection belongs to.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Execute a query that returns rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, PicoError> {
        self.client.query(sql, params).await.map_err(PicoError::from)
    }

    /// Execute a query that returns at most one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<tokio_postgres::Row>, PicoError> {
        self.client.query_opt(sql, params).await.map_err(PicoError::from)
    }

    /// Prepare a statement.
    pub async fn prepare(&self, sql: &str) -> Result<tokio_postgres::Statement, PicoError> {
        self.client.prepare(sql).await.map_err(PicoError::from)
    }

    /// Run a prepared statement without parameters, streaming its rows.
    pub async fn query_raw(
        &self,
        statement: &tokio_postgres::Statement,
    ) -> Result<tokio_postgres::RowStream, PicoError> {
        self.client
            .query_raw(statement, std::iter::empty::<&str>())
            .await
            .map_err(PicoError::from)
    }

    /// Run query text through the simple query protocol.
    pub async fn simple_query(
        &self,
        sql: &str,
    ) -> Result<Vec<tokio_postgres::SimpleQueryMessage>, PicoError> {
        self.client.simple_query(sql).await.map_err(PicoError::from)
    }
}

/// Outcome of a connectivity test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    /// Whether the server accepted the connection.
    pub success: bool,
    /// `SELECT version()` output on success.
    pub server_version: Option<String>,
    /// Round-trip time of the whole test.
    pub latency_ms: u64,
    /// User-facing failure message.
    pub error: Option<String>,
}

/// Connectivity checks for profiles.
pub struct ConnectionService;

impl ConnectionService {
    /// Test a profile without saving anything. Never fails; failures are
    /// reported in the result.
    pub async fn test_connection(
        profile: &ConnectionProfile,
        options: &ConnectionOptions,
    ) -> ConnectionTestResult {
        let start = Instant::now();

        let outcome = async {
            profile.validate()?;
            let pool = ConnectionPool::open(profile, options).await?;
            let version = async {
                let conn = pool.get().await?;
                let row = conn.query_opt("SELECT version()", &[]).await?;
                Ok::<_, PicoError>(row.and_then(|r| r.try_get::<_, String>(0).ok()))
            }
            .await;
            pool.close();
            version
        }
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(server_version) => {
                tracing::info!(connection_id = %profile.id, latency_ms, "Connection test succeeded");
                ConnectionTestResult { success: true, server_version, latency_ms, error: None }
            }
            Err(e) => {
                tracing::warn!(connection_id = %profile.id, error = %e, "Connection test failed");
                ConnectionTestResult {
                    success: false,
                    server_version: None,
                    latency_ms,
                    error: Some(e.user_message()),
                }
            }
        }
    }
}
