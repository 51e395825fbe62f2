//! Error types for picopg.
//!
//! Every failure the client can hit (connection refusal, authentication,
//! malformed SQL, local storage) ends up as a [`PicoError`]. Front ends only
//! ever show [`PicoError::user_message`].

use thiserror::Error;

/// Main error type for picopg.
#[derive(Debug, Error)]
pub enum PicoError {
    /// Database connection failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// SSL/TLS error.
    #[error("SSL error: {message}")]
    Ssl {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// Local profile storage error.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No saved profile matches the given id or name.
    #[error("Connection not found: {key}")]
    ProfileNotFound {
        /// The id or name that was looked up.
        key: String,
    },

    /// A profile failed validation.
    #[error("Invalid connection: {message}")]
    Validation {
        /// What is wrong with the profile.
        message: String,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PicoError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Check username and password".to_string()),
        }
    }

    /// Create a new SSL error with source.
    pub fn ssl_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Ssl { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new query error with full PostgreSQL details.
    pub fn query(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<usize>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, position, code }
    }

    /// Create a new storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    /// Create a new storage error with source.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage { message: message.into(), hint: None, source: Some(Box::new(source)) }
    }

    /// Create a profile-not-found error.
    pub fn profile_not_found(key: impl Into<String>) -> Self {
        Self::ProfileNotFound { key: key.into() }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this error means the server could not be reached or dropped us.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Ssl { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Ssl { .. } => "SSL",
            Self::Query { .. } => "Query",
            Self::Storage { .. } => "Storage",
            Self::ProfileNotFound { .. } => "Connection",
            Self::Validation { .. } => "Validation",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Ssl { .. } => Some("Verify the SSL mode and server certificate"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Storage { hint, .. } => hint.as_deref(),
            Self::ProfileNotFound { .. } => Some("Run `picopg connections list` to see saved connections"),
            Self::Validation { .. } => None,
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Query { position, .. } => *position,
            _ => None,
        }
    }

    /// The single string shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self} ({hint})"),
            None => self.to_string(),
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for verbose output.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

impl From<tokio_postgres::Error> for PicoError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();
            let code = Some(code_str.to_string());

            return match code_str {
                "28P01" => PicoError::Authentication {
                    message,
                    hint: Some("Invalid password - check your credentials".to_string()),
                },
                "28000" => PicoError::Authentication {
                    message,
                    hint: Some("Authentication failed - check username and permissions".to_string()),
                },
                // Connection exceptions (08xxx)
                _ if code_str.starts_with("08") => {
                    PicoError::Connection { message, source: Some(Box::new(err)) }
                }
                _ => PicoError::Query { message, detail, hint, position, code },
            };
        }

        if err.is_closed() {
            return PicoError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        PicoError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<deadpool_postgres::PoolError> for PicoError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => PicoError::from(e),
            other => PicoError::connection(format!("Failed to acquire connection: {other}")),
        }
    }
}

impl From<rusqlite::Error> for PicoError {
    fn from(err: rusqlite::Error) -> Self {
        PicoError::Storage {
            message: err.to_string(),
            hint: Some("The local database may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for PicoError {
    fn from(err: std::io::Error) -> Self {
        PicoError::Storage {
            message: err.to_string(),
            hint: Some("Check file permissions and disk space".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for PicoError {
    fn from(err: serde_json::Error) -> Self {
        PicoError::Storage {
            message: format!("JSON error: {err}"),
            hint: Some("Data may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<base64::DecodeError> for PicoError {
    fn from(err: base64::DecodeError) -> Self {
        PicoError::Storage {
            message: format!("Stored password is not valid base64: {err}"),
            hint: Some("Re-enter the password for this connection".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_includes_hint() {
        let err = PicoError::connection("refused");
        assert_eq!(
            err.user_message(),
            "Connection error: refused (Check that the database server is running)"
        );
    }

    #[test]
    fn test_user_message_without_hint() {
        let err = PicoError::validation("Host is required");
        assert_eq!(err.user_message(), "Invalid connection: Host is required");
    }

    #[test]
    fn test_query_error_info_details() {
        let err = PicoError::query(
            "relation \"missing\" does not exist",
            None,
            None,
            Some(15),
            Some("42P01".to_string()),
        );
        let info = err.to_error_info();
        assert_eq!(info.error_type, "Query Error");
        assert_eq!(info.message, "relation \"missing\" does not exist");
        assert_eq!(info.technical_detail.as_deref(), Some("Code: 42P01\nPosition: 15"));
        assert_eq!(err.pg_code(), Some("42P01"));
        assert_eq!(err.position(), Some(15));
    }

    #[test]
    fn test_categories() {
        assert_eq!(PicoError::profile_not_found("x").category(), "Connection");
        assert_eq!(PicoError::storage("x", None).category(), "Storage");
        assert!(PicoError::connection("x").is_connection_error());
        assert!(!PicoError::config("x").is_connection_error());
    }

    #[test]
    fn test_decode_error_maps_to_storage() {
        use base64::Engine;
        let err: PicoError = base64::engine::general_purpose::STANDARD
            .decode("not base64!!")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), "Storage");
    }
}
