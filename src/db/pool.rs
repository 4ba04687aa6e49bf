//! Connection pool management.
//!
//! Each logical database owns a primary pool and, with read/write separation,
//! a replica pool. Pools are database-specific (MySqlPool, PgPool, SqlitePool)
//! to keep full type support.

use crate::config::{DEFAULT_IDLE_TIMEOUT_SECS, DatabaseSettings};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DriverKind};
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the driver kind for this pool.
    pub fn driver(&self) -> DriverKind {
        match self {
            DbPool::MySql(_) => DriverKind::MySql,
            DbPool::Postgres(_) => DriverKind::Postgres,
            DbPool::SQLite(_) => DriverKind::Sqlite,
        }
    }

    /// Maximum number of open connections the pool allows.
    pub fn max_connections(&self) -> u32 {
        match self {
            DbPool::MySql(pool) => pool.options().get_max_connections(),
            DbPool::Postgres(pool) => pool.options().get_max_connections(),
            DbPool::SQLite(pool) => pool.options().get_max_connections(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        match self {
            DbPool::MySql(pool) => pool.options().get_acquire_timeout(),
            DbPool::Postgres(pool) => pool.options().get_acquire_timeout(),
            DbPool::SQLite(pool) => pool.options().get_acquire_timeout(),
        }
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        match self {
            DbPool::MySql(pool) => pool.options().get_max_lifetime(),
            DbPool::Postgres(pool) => pool.options().get_max_lifetime(),
            DbPool::SQLite(pool) => pool.options().get_max_lifetime(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }
}

/// Pool sizing derived from the configured pool size.
///
/// `max_idle` is ceil(max_open / 2). sqlx has no idle cap, so it is only
/// reported here; idle connections are reaped by `idle_timeout` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    pub max_idle: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl PoolLimits {
    pub fn from_size(size: u32, lifetime: Duration) -> Self {
        Self {
            max_open: size,
            max_idle: size.div_ceil(2),
            max_lifetime: lifetime,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            acquire_timeout: Duration::from_secs(crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            acquire_timeout: settings.acquire_timeout_duration(),
            ..Self::from_size(settings.pool_size, settings.pool_life_time_duration())
        }
    }
}

/// Whether a statement reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Read,
    Write,
}

/// Which physical connection a statement is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Replica,
}

/// A named logical database: driver, primary pool and optional read replica.
#[derive(Debug)]
pub struct LogicalDatabase {
    name: String,
    driver: DriverKind,
    primary: DbPool,
    replica: Option<DbPool>,
    table_prefix: String,
    limits: PoolLimits,
}

impl LogicalDatabase {
    /// Validate `settings` and open the pools for the logical database `name`.
    ///
    /// The primary pool is opened eagerly. When the replica fails to open the
    /// primary is closed before the error is returned.
    pub async fn open(name: &str, settings: &DatabaseSettings) -> DbResult<Self> {
        settings.validate(name)?;
        let driver = DriverKind::from_str(&settings.driver)?;
        let limits = PoolLimits::from_settings(settings);

        let master = settings
            .master
            .as_ref()
            .ok_or_else(|| DbError::config(format!("database '{}': missing master", name)))?;
        let primary = create_pool(driver, master, &limits).await?;
        info!(
            database = %name,
            driver = %driver,
            dsn = %master.masked_dsn(driver),
            max_open = limits.max_open,
            max_idle = limits.max_idle,
            "Primary connection established"
        );

        let replica = match (settings.separation, settings.slave.as_ref()) {
            (true, Some(slave)) => match create_pool(driver, slave, &limits).await {
                Ok(pool) => {
                    info!(
                        database = %name,
                        dsn = %slave.masked_dsn(driver),
                        "Replica connection established"
                    );
                    Some(pool)
                }
                Err(e) => {
                    primary.close().await;
                    return Err(e);
                }
            },
            _ => None,
        };

        Ok(Self {
            name: name.to_string(),
            driver,
            primary,
            replica,
            table_prefix: settings.table_prefix.clone(),
            limits,
        })
    }

    /// Pick the connection for a statement.
    ///
    /// Writes always use the primary. Reads use the replica when one is
    /// registered and the caller did not force the primary.
    pub fn route(&self, kind: QueryKind, force: bool) -> Route {
        match (kind, &self.replica) {
            (QueryKind::Read, Some(_)) if !force => Route::Replica,
            _ => Route::Primary,
        }
    }

    /// Pool serving `route`.
    pub fn pool(&self, route: Route) -> &DbPool {
        match (route, &self.replica) {
            (Route::Replica, Some(replica)) => replica,
            _ => &self.primary,
        }
    }

    pub fn pool_for(&self, kind: QueryKind, force: bool) -> &DbPool {
        self.pool(self.route(kind, force))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    pub fn has_replica(&self) -> bool {
        self.replica.is_some()
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    pub fn primary(&self) -> &DbPool {
        &self.primary
    }

    pub fn replica(&self) -> Option<&DbPool> {
        self.replica.as_ref()
    }

    /// Close the primary and replica pools.
    pub async fn close(&self) {
        info!(database = %self.name, "Closing connections");
        self.primary.close().await;
        if let Some(replica) = &self.replica {
            replica.close().await;
        }
    }
}

/// Open a pool for `descriptor`.
pub(crate) async fn create_pool(
    driver: DriverKind,
    descriptor: &ConnectionDescriptor,
    limits: &PoolLimits,
) -> DbResult<DbPool> {
    let dsn = descriptor.dsn(driver)?;
    debug!(dsn = %descriptor.masked_dsn(driver), "Opening pool");

    let connect_error = |e: sqlx::Error| {
        DbError::connection(
            format!("Failed to connect: {}", e),
            connection_suggestion(driver, &e),
        )
    };
    let invalid_dsn = |e: sqlx::Error| {
        DbError::connection(
            format!("Invalid {} connection string: {}", driver, e),
            connection_suggestion(driver, &e),
        )
    };

    match driver {
        DriverKind::MySql => {
            let options = MySqlConnectOptions::from_str(&dsn)
                .map_err(invalid_dsn)?
                .charset("utf8mb4");
            let pool = MySqlPoolOptions::new()
                .min_connections(0)
                .max_connections(limits.max_open)
                .max_lifetime(limits.max_lifetime)
                .idle_timeout(limits.idle_timeout)
                .acquire_timeout(limits.acquire_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::MySql(pool))
        }
        DriverKind::Postgres => {
            let options = PgConnectOptions::from_str(&dsn).map_err(invalid_dsn)?;
            let pool = PgPoolOptions::new()
                .min_connections(0)
                .max_connections(limits.max_open)
                .max_lifetime(limits.max_lifetime)
                .idle_timeout(limits.idle_timeout)
                .acquire_timeout(limits.acquire_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::Postgres(pool))
        }
        DriverKind::Sqlite => {
            let options = SqliteConnectOptions::from_str(&dsn)
                .map_err(invalid_dsn)?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(limits.max_open)
                .max_lifetime(limits.max_lifetime)
                .idle_timeout(limits.idle_timeout)
                .acquire_timeout(limits.acquire_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(driver: DriverKind, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", driver);
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password of the connection".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match driver {
        DriverKind::Postgres => "Verify host, port and database of the postgres connection".to_string(),
        DriverKind::MySql => "Verify host, port and database of the mysql connection".to_string(),
        DriverKind::Sqlite => "Verify the database file path is writable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_limits_from_size() {
        let limits = PoolLimits::from_size(50, Duration::from_secs(3600));
        assert_eq!(limits.max_open, 50);
        assert_eq!(limits.max_idle, 25);
        assert_eq!(limits.max_lifetime, Duration::from_secs(3600));
    }

    #[test]
    fn test_pool_limits_idle_rounds_up() {
        assert_eq!(PoolLimits::from_size(7, Duration::ZERO).max_idle, 4);
        assert_eq!(PoolLimits::from_size(1, Duration::ZERO).max_idle, 1);
    }

    #[test]
    fn test_pool_limits_from_settings() {
        let settings = DatabaseSettings::new("sqlite", ConnectionDescriptor::sqlite("x.db"))
            .with_pool_size(10);
        let limits = PoolLimits::from_settings(&settings);
        assert_eq!(limits.max_open, 10);
        assert_eq!(limits.max_idle, 5);
        assert_eq!(
            limits.acquire_timeout,
            Duration::from_secs(crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS)
        );
    }

    #[tokio::test]
    async fn test_open_rejects_unsupported_driver() {
        let settings = DatabaseSettings::new(
            "mssql",
            ConnectionDescriptor::new("db1", 1433, "sa", "secret", "orders"),
        );
        let err = LogicalDatabase::open("orders", &settings).await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDriver { .. }));
    }

    #[tokio::test]
    async fn test_open_rejects_missing_replica() {
        let mut settings = DatabaseSettings::new("sqlite", ConnectionDescriptor::sqlite("x.db"));
        settings.separation = true;
        let err = LogicalDatabase::open("orders", &settings).await.unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }
}
