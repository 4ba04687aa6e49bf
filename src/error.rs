//! Error types for the data-access layer.
//!
//! Every failure is a `DbError`. Startup failures (`Config`, `UnsupportedDriver`,
//! connection failures during `init`) are returned from
//! [`RegistryBuilder::init`](crate::db::RegistryBuilder::init) and are meant to
//! stop the process; everything a CRUD call can produce is recoverable and is
//! grouped under [`DbError::is_storage`].

use thiserror::Error;

/// Generic message presented to end users for storage failures.
pub const PUBLIC_DATABASE_ERROR: &str = "database error";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported database driver: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Record not found: {message}")]
    NotFound { message: String },

    #[error("No rows affected: {operation}")]
    NoRowsAffected { operation: String },

    #[error("Database '{database}' not found")]
    DatabaseNotFound { database: String },

    #[error("Database '{database}' for tenant {tenant_id} not found")]
    TenantDatabaseNotFound { tenant_id: i64, database: String },

    #[error(
        "Timeout: {operation}{}",
        .elapsed_secs.map(|secs| format!(" exceeded {}s", secs)).unwrap_or_default()
    )]
    Timeout {
        operation: String,
        /// Configured limit, when known at the point of failure
        elapsed_secs: Option<u64>,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Dangerous operation blocked: {operation}. {reason}")]
    DangerousOperationBlocked { operation: String, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unsupported driver error.
    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn no_rows_affected(operation: impl Into<String>) -> Self {
        Self::NoRowsAffected {
            operation: operation.into(),
        }
    }

    pub fn database_not_found(database: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
        }
    }

    pub fn tenant_database_not_found(tenant_id: i64, database: impl Into<String>) -> Self {
        Self::TenantDatabaseNotFound {
            tenant_id,
            database: database.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs: Some(elapsed_secs),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a dangerous operation blocked error.
    pub fn dangerous_operation_blocked(
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DangerousOperationBlocked {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Whether this error belongs to the storage category returned by CRUD calls.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Database { .. }
                | Self::NotFound { .. }
                | Self::NoRowsAffected { .. }
                | Self::DatabaseNotFound { .. }
                | Self::TenantDatabaseNotFound { .. }
                | Self::Timeout { .. }
        )
    }

    /// Whether this error means the configuration must be fixed before restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::UnsupportedDriver { .. })
    }

    /// Message safe to show outside the process.
    ///
    /// Storage errors collapse to [`PUBLIC_DATABASE_ERROR`]; the raw message
    /// stays available through `Display` for logs.
    pub fn public_message(&self) -> String {
        if self.is_storage() {
            PUBLIC_DATABASE_ERROR.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection descriptor and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::not_found("no rows returned"),
            // The executor reports the pool's configured limit; sqlx does not carry it.
            sqlx::Error::PoolTimedOut => DbError::Timeout {
                operation: "connection pool acquire".to_string(),
                elapsed_secs: None,
            },
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reinitialize the registry")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::internal(format!("Row (de)serialization failed: {}", err))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_timeout_display_includes_limit() {
        let err = DbError::timeout("connection pool acquire", 5);
        assert_eq!(err.to_string(), "Timeout: connection pool acquire exceeded 5s");
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
    }

    #[test]
    fn test_storage_errors_hide_raw_message() {
        let err = DbError::database("relation \"secret\" does not exist", None, "check");
        assert!(err.is_storage());
        assert_eq!(err.public_message(), PUBLIC_DATABASE_ERROR);
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_storage_category_members() {
        assert!(DbError::not_found("user 5").is_storage());
        assert!(DbError::no_rows_affected("update").is_storage());
        assert!(DbError::tenant_database_not_found(7, "orders_7").is_storage());
        assert!(DbError::database_not_found("orders").is_storage());
        assert!(!DbError::config("missing master").is_storage());
        assert!(!DbError::invalid_input("x").is_storage());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(DbError::config("no configuration for 'orders'").is_fatal());
        assert!(DbError::unsupported_driver("mssql").is_fatal());
        assert!(!DbError::not_found("row").is_fatal());
    }

    #[test]
    fn test_non_storage_public_message_is_display() {
        let err = DbError::invalid_input("empty update payload");
        assert_eq!(err.public_message(), err.to_string());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Timeout { elapsed_secs: None, .. }));
        assert_eq!(err.to_string(), "Timeout: connection pool acquire");
        assert!(err.is_retryable());
    }
}
