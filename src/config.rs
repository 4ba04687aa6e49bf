//! Configuration handling.
//!
//! Two layers: the process-level [`Config`] parsed from CLI arguments and
//! environment variables, and the [`DatabasesConfig`] map loaded from a JSON
//! file that describes every logical database.

use crate::error::{DbError, DbResult};
use crate::models::ConnectionDescriptor;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_APP_DIR: &str = "./";
pub const DEFAULT_DATABASE_CONFIG_FILE: &str = "database.json";

// Pool configuration defaults
pub const DEFAULT_POOL_SIZE: u32 = 50;
pub const DEFAULT_POOL_LIFE_TIME_SECS: u64 = 3600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_pool_life_time() -> u64 {
    DEFAULT_POOL_LIFE_TIME_SECS
}

fn default_acquire_timeout() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

/// Settings of one logical database, as found in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Driver name: "postgres", "mysql" or "sqlite"
    pub driver: String,
    /// Route reads to `slave` when true
    #[serde(default)]
    pub separation: bool,
    /// Primary connection
    #[serde(default)]
    pub master: Option<ConnectionDescriptor>,
    /// Read replica, required when `separation` is on
    #[serde(default)]
    pub slave: Option<ConnectionDescriptor>,
    #[serde(default)]
    pub table_prefix: String,
    /// Maximum open connections (default: 50)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Maximum connection lifetime in seconds (default: 3600)
    #[serde(default = "default_pool_life_time", alias = "pool_life_time_seconds")]
    pub pool_life_time: u64,
    /// Connection acquire timeout in seconds (default: 30)
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    /// Settings for a primary-only database with default pool options.
    pub fn new(driver: impl Into<String>, master: ConnectionDescriptor) -> Self {
        Self {
            driver: driver.into(),
            separation: false,
            master: Some(master),
            slave: None,
            table_prefix: String::new(),
            pool_size: DEFAULT_POOL_SIZE,
            pool_life_time: DEFAULT_POOL_LIFE_TIME_SECS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }

    /// Enable read/write separation with the given replica.
    pub fn with_replica(mut self, slave: ConnectionDescriptor) -> Self {
        self.separation = true;
        self.slave = Some(slave);
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn pool_life_time_duration(&self) -> Duration {
        Duration::from_secs(self.pool_life_time)
    }

    pub fn acquire_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout)
    }

    /// Validate settings for the logical database `name`.
    pub fn validate(&self, name: &str) -> DbResult<()> {
        if self.master.is_none() {
            return Err(DbError::config(format!(
                "database '{}': master connection must be configured",
                name
            )));
        }
        if self.separation && self.slave.is_none() {
            return Err(DbError::config(format!(
                "database '{}': slave connection must be configured when separation is enabled",
                name
            )));
        }
        if self.pool_size == 0 {
            return Err(DbError::config(format!(
                "database '{}': pool_size must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

/// Mapping from logical database name to its settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabasesConfig {
    databases: HashMap<String, DatabaseSettings>,
}

impl DatabasesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the configuration from a JSON document.
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbError::config(format!("invalid database configuration: {}", e)))
    }

    /// Load the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!(
                "cannot read database configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    pub fn insert(&mut self, name: impl Into<String>, settings: DatabaseSettings) {
        self.databases.insert(name.into(), settings);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, settings: DatabaseSettings) -> Self {
        self.insert(name, settings);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseSettings> {
        self.databases.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

/// Process configuration for the bootstrap binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "svc-foundation",
    about = "Opens every configured logical database and resolves model schemas",
    version,
    author
)]
pub struct Config {
    /// The application directory
    #[arg(long, default_value = DEFAULT_APP_DIR, env = "APP_DIR")]
    pub dir: PathBuf,

    /// Database configuration file, relative to the application directory
    #[arg(
        long = "database-config",
        default_value = DEFAULT_DATABASE_CONFIG_FILE,
        env = "APP_DATABASE_CONFIG"
    )]
    pub database_config: PathBuf,

    /// Logical databases to register. Defaults to every configured database.
    #[arg(
        short = 'd',
        long = "database",
        value_name = "NAME",
        env = "APP_DATABASES",
        value_delimiter = ','
    )]
    pub databases: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "APP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "APP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_APP_DIR),
            database_config: PathBuf::from(DEFAULT_DATABASE_CONFIG_FILE),
            databases: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Full path of the database configuration file.
    pub fn database_config_path(&self) -> PathBuf {
        if self.database_config.is_absolute() {
            self.database_config.clone()
        } else {
            self.dir.join(&self.database_config)
        }
    }

    /// Load the database configuration file.
    pub fn load_databases(&self) -> DbResult<DatabasesConfig> {
        DatabasesConfig::from_file(self.database_config_path())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn descriptor(database: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new("localhost", 5432, "app", "secret", database)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.databases.is_empty());
    }

    #[test]
    fn test_database_config_path_joins_dir() {
        let config = Config {
            dir: PathBuf::from("/srv/app"),
            ..Config::default()
        };
        assert_eq!(
            config.database_config_path(),
            PathBuf::from("/srv/app/database.json")
        );
    }

    #[test]
    fn test_database_config_path_absolute_wins() {
        let config = Config {
            dir: PathBuf::from("/srv/app"),
            database_config: PathBuf::from("/etc/db.json"),
            ..Config::default()
        };
        assert_eq!(config.database_config_path(), PathBuf::from("/etc/db.json"));
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let config = DatabasesConfig::from_json_str(
            r#"{
                "orders": {
                    "driver": "postgres",
                    "master": {"host": "db1", "port": 5432, "user": "u", "password": "p", "database": "orders"}
                }
            }"#,
        )
        .unwrap();

        let orders = config.get("orders").unwrap();
        assert_eq!(orders.driver, "postgres");
        assert!(!orders.separation);
        assert!(orders.slave.is_none());
        assert_eq!(orders.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(
            orders.pool_life_time_duration(),
            Duration::from_secs(DEFAULT_POOL_LIFE_TIME_SECS)
        );
        assert_eq!(orders.table_prefix, "");
    }

    #[test]
    fn test_parse_json_with_replica() {
        let config = DatabasesConfig::from_json_str(
            r#"{
                "orders": {
                    "driver": "mysql",
                    "separation": true,
                    "master": {"host": "db1", "port": 3306, "user": "u", "password": "p", "database": "orders"},
                    "slave": {"host": "db2", "port": 3306, "user": "u", "password": "p", "database": "orders"},
                    "table_prefix": "t_",
                    "pool_size": 20,
                    "pool_life_time": 600
                }
            }"#,
        )
        .unwrap();

        let orders = config.get("orders").unwrap();
        assert!(orders.separation);
        assert_eq!(orders.slave.as_ref().unwrap().host, "db2");
        assert_eq!(orders.table_prefix, "t_");
        assert_eq!(orders.pool_size, 20);
        assert_eq!(orders.pool_life_time_duration(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_json_pool_life_time_seconds_key() {
        let config = DatabasesConfig::from_json_str(
            r#"{
                "orders": {
                    "driver": "sqlite",
                    "master": {"database": "orders.db"},
                    "pool_life_time_seconds": 120
                }
            }"#,
        )
        .unwrap();

        let orders = config.get("orders").unwrap();
        assert_eq!(orders.pool_life_time_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_json_invalid() {
        let result = DatabasesConfig::from_json_str("{not json");
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"reports": {{"driver": "sqlite", "master": {{"database": "reports.db"}}}}}}"#
        )
        .unwrap();

        let config = DatabasesConfig::from_file(file.path()).unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(
            config.get("reports").unwrap().master.as_ref().unwrap().database,
            "reports.db"
        );
    }

    #[test]
    fn test_from_missing_file() {
        let result = DatabasesConfig::from_file("/nonexistent/database.json");
        assert!(matches!(result, Err(DbError::Config { .. })));
    }

    #[test]
    fn test_validate_missing_master() {
        let mut settings = DatabaseSettings::new("postgres", descriptor("orders"));
        settings.master = None;
        let err = settings.validate("orders").unwrap_err();
        assert!(err.to_string().contains("master"));
    }

    #[test]
    fn test_validate_separation_requires_slave() {
        let mut settings = DatabaseSettings::new("postgres", descriptor("orders"));
        settings.separation = true;
        let err = settings.validate("orders").unwrap_err();
        assert!(err.to_string().contains("slave"));
    }

    #[test]
    fn test_validate_pool_size_zero() {
        let settings = DatabaseSettings::new("postgres", descriptor("orders")).with_pool_size(0);
        let err = settings.validate("orders").unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn test_validate_ok_with_replica() {
        let settings = DatabaseSettings::new("postgres", descriptor("orders"))
            .with_replica(descriptor("orders"));
        assert!(settings.validate("orders").is_ok());
    }
}
