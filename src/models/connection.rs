//! Connection-related data models.
//!
//! This module defines the driver kinds and the connection descriptor each
//! logical database is configured with.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl DriverKind {
    /// Get the display name for this driver.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Get the default port for this driver.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for DriverKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Err(DbError::unsupported_driver(s)),
            "" => Err(DbError::config("database driver must be set")),
            other => Err(DbError::config(format!("unknown database driver: {}", other))),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where and how to reach one physical database.
///
/// For SQLite only `database` is used and holds the file path.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(default)]
    pub host: String,
    /// 0 means the driver's default port
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: String,
    pub database: String,
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }

    /// Descriptor for a SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    /// Build the driver-specific connection string.
    pub fn dsn(&self, driver: DriverKind) -> DbResult<String> {
        self.build_dsn(driver, false)
    }

    /// Connection string with the password replaced, safe to log.
    pub fn masked_dsn(&self, driver: DriverKind) -> String {
        self.build_dsn(driver, true)
            .unwrap_or_else(|_| format!("{}://<invalid>", driver.scheme()))
    }

    fn build_dsn(&self, driver: DriverKind, masked: bool) -> DbResult<String> {
        if self.database.is_empty() {
            return Err(DbError::config("connection database name must be set"));
        }
        if driver == DriverKind::Sqlite {
            return Ok(format!("sqlite://{}", self.database));
        }
        if self.host.is_empty() {
            return Err(DbError::config(format!(
                "{} connection host must be set",
                driver
            )));
        }

        let invalid = |what: &str| DbError::config(format!("invalid connection {}", what));
        let mut url = Url::parse(&format!("{}://localhost", driver.scheme()))
            .map_err(|_| invalid("scheme"))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        let port = match self.port {
            0 => driver.default_port(),
            port => Some(port),
        };
        url.set_port(port).map_err(|_| invalid("port"))?;
        if !self.user.is_empty() {
            url.set_username(&self.user).map_err(|_| invalid("user"))?;
        }
        if !self.password.is_empty() {
            let password = if masked { "****" } else { self.password.as_str() };
            url.set_password(Some(password))
                .map_err(|_| invalid("password"))?;
        }
        url.set_path(&format!("/{}", self.database));
        Ok(url.to_string())
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .finish()
    }
}
