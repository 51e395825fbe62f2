//! Connection profile models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PicoError;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// SSL mode for database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No SSL
    Disable,
    /// Use SSL if available
    Prefer,
    /// Require SSL, accept any certificate
    Require,
    /// Require SSL, verify CA
    VerifyCa,
    /// Require SSL, verify CA and hostname
    VerifyFull,
}

impl SslMode {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disable" => Self::Disable,
            "require" => Self::Require,
            "verify-ca" | "verify_ca" => Self::VerifyCa,
            "verify-full" | "verify_full" => Self::VerifyFull,
            _ => Self::Prefer,
        }
    }

    /// Parse a libpq `sslmode` value. `allow` is treated as `prefer`.
    pub fn from_param(value: &str) -> Result<Self, PicoError> {
        match value {
            "disable" => Ok(Self::Disable),
            "allow" | "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(PicoError::validation(format!("Unsupported sslmode: {other}"))),
        }
    }

    /// Whether the connection is made over TLS at all.
    pub fn uses_tls(&self) -> bool {
        !matches!(self, Self::Disable)
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime options applied to every connection.
///
/// These are not stored per profile; they come from [`crate::config::AppConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u32,
    /// Query timeout in seconds (None = no timeout)
    pub statement_timeout_secs: Option<u32>,
    /// Application name sent to PostgreSQL
    pub application_name: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            statement_timeout_secs: None,
            application_name: "picopg".to_string(),
        }
    }
}

/// A saved set of credentials identifying one database.
///
/// The password is held in plain text in memory. It is only transformed when
/// written to local storage (see [`crate::services::password`]), and that
/// transform is an encoding, not encryption.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    /// Unique identifier
    pub id: Uuid,
    /// Display name (1-255 chars)
    pub name: String,
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 5432)
    pub port: u16,
    /// Database name (1-63 chars)
    pub database: String,
    /// Login username
    pub username: String,
    /// Login password
    #[serde(default)]
    pub password: String,
    /// SSL configuration; absent means no SSL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<SslMode>,
    /// Last successful database operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
    /// When the profile was created
    pub created_at: DateTime<Utc>,
    /// When the profile was last modified
    pub updated_at: DateTime<Utc>,
}

impl ConnectionProfile {
    /// Create a new profile with required fields.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            database: database.into(),
            username: username.into(),
            password: String::new(),
            ssl_mode: None,
            last_connected: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a builder for complex profiles.
    pub fn builder() -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::default()
    }

    /// Build a profile from a `postgres://` URL or a libpq key/value string.
    ///
    /// `sslmode` is read here rather than by the driver, which only knows
    /// `disable`, `prefer` and `require`.
    pub fn from_url(name: impl Into<String>, url: &str) -> Result<Self, PicoError> {
        let (url, ssl_mode) = split_ssl_mode(url)?;
        let config: tokio_postgres::Config = url
            .parse()
            .map_err(|e| PicoError::validation(format!("Invalid connection URL: {e}")))?;

        let host = match config.get_hosts().first() {
            Some(tokio_postgres::config::Host::Tcp(host)) => host.clone(),
            #[allow(unreachable_patterns)]
            Some(_) => {
                return Err(PicoError::validation("Only TCP hosts are supported"));
            }
            None => "localhost".to_string(),
        };
        let port = config.get_ports().first().copied().unwrap_or(DEFAULT_PORT);
        let username = config
            .get_user()
            .ok_or_else(|| PicoError::validation("Connection URL has no user"))?
            .to_string();
        let database = config.get_dbname().unwrap_or(username.as_str()).to_string();
        let password = match config.get_password() {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| PicoError::validation("Password is not valid UTF-8"))?,
            None => String::new(),
        };

        let mut profile = Self::new(name, host, database, username);
        profile.port = port;
        profile.password = password;
        profile.ssl_mode = ssl_mode;
        profile.validate()?;
        Ok(profile)
    }

    /// Validate the profile.
    pub fn validate(&self) -> Result<(), PicoError> {
        if self.name.is_empty() || self.name.chars().count() > 255 {
            return Err(PicoError::validation("Name must be 1-255 characters"));
        }
        if self.host.trim().is_empty() {
            return Err(PicoError::validation("Host is required"));
        }
        if self.port == 0 {
            return Err(PicoError::validation("Port must be between 1 and 65535"));
        }
        if self.database.is_empty() || self.database.len() > 63 {
            return Err(PicoError::validation("Database name must be 1-63 characters"));
        }
        if self.username.is_empty() {
            return Err(PicoError::validation("Username is required"));
        }
        Ok(())
    }

    /// SSL mode used when connecting.
    pub fn effective_ssl_mode(&self) -> SslMode {
        self.ssl_mode.unwrap_or(SslMode::Disable)
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }

    /// Record a successful database operation.
    pub fn touch_connected(&mut self, now: DateTime<Utc>) {
        self.last_connected = Some(now);
        self.updated_at = now;
    }
}

/// Remove the `sslmode` parameter from a URL or key/value string.
fn split_ssl_mode(url: &str) -> Result<(String, Option<SslMode>), PicoError> {
    let mut ssl_mode = None;
    let mut keep = |param: &str| -> Result<bool, PicoError> {
        match param.split_once('=') {
            Some((key, value)) if key.trim() == "sslmode" => {
                ssl_mode = Some(SslMode::from_param(value.trim())?);
                Ok(false)
            }
            _ => Ok(!param.is_empty()),
        }
    };

    let rest = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        match url.split_once('?') {
            Some((base, query)) => {
                let mut params = Vec::new();
                for param in query.split('&') {
                    if keep(param)? {
                        params.push(param);
                    }
                }
                if params.is_empty() {
                    base.to_string()
                } else {
                    format!("{base}?{}", params.join("&"))
                }
            }
            None => url.to_string(),
        }
    } else {
        let mut params = Vec::new();
        for param in url.split_whitespace() {
            if keep(param)? {
                params.push(param);
            }
        }
        params.join(" ")
    };

    Ok((rest, ssl_mode))
}

impl PartialEq for ConnectionProfile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionProfile {}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("last_connected", &self.last_connected)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Builder for ConnectionProfile.
#[derive(Debug, Default)]
pub struct ConnectionProfileBuilder {
    name: Option<String>,
    host: Option<String>,
    port: u16,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    ssl_mode: Option<SslMode>,
}

impl ConnectionProfileBuilder {
    /// Set the connection name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the SSL mode.
    pub fn ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = Some(ssl_mode);
        self
    }

    /// Build the profile.
    pub fn build(self) -> Result<ConnectionProfile, PicoError> {
        let mut profile = ConnectionProfile::new(
            self.name.ok_or_else(|| PicoError::validation("Name is required"))?,
            self.host.ok_or_else(|| PicoError::validation("Host is required"))?,
            self.database.ok_or_else(|| PicoError::validation("Database is required"))?,
            self.username.ok_or_else(|| PicoError::validation("Username is required"))?,
        );
        profile.port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        profile.password = self.password.unwrap_or_default();
        profile.ssl_mode = self.ssl_mode;
        profile.validate()?;
        Ok(profile)
    }
}
