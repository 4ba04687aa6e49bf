//! Service bootstrap - Main entry point.
//!
//! Opens every configured logical database, logs readiness and holds the
//! pools until interrupted.

use std::sync::Arc;
use svc_foundation::config::Config;
use svc_foundation::db::RegistryBuilder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    info!(
        config = %config.database_config_path().display(),
        "Starting svc-foundation v{}",
        env!("CARGO_PKG_VERSION")
    );

    let databases = match config.load_databases() {
        Ok(databases) => databases,
        Err(e) => {
            error!(error = %e, "Failed to load database configuration");
            std::process::exit(1);
        }
    };

    let names: Vec<String> = if config.databases.is_empty() {
        databases.names().map(str::to_string).collect()
    } else {
        config.databases.clone()
    };

    let builder = names
        .iter()
        .fold(RegistryBuilder::new(), |builder, name| builder.register(name));

    let registry = match builder.init(&databases).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(error = %e, "Database initialization failed");
            std::process::exit(1);
        }
    };

    info!(databases = ?registry.database_names(), "All databases ready");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    registry.close().await;
    info!("Shutdown complete");
    Ok(())
}
