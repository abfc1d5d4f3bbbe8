//! tinyorm - connectivity check.
//!
//! Opens a connection pool from command-line flags, environment variables or
//! a connection URL, reports what it connected to, and shuts the pool down.

use clap::Parser;
use tinyorm::config::Config;
use tinyorm::db::Pool;
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
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting tinyorm v{}", env!("CARGO_PKG_VERSION"));

    let pool_config = config.pool_config()?;
    let pool = Pool::new();

    let info = match pool.create(pool_config).await {
        Ok(info) => info,
        Err(e) => {
            error!(
                error = %e,
                suggestion = e.suggestion().unwrap_or_default(),
                "Failed to create connection pool"
            );
            return Err(e.into());
        }
    };

    let status = pool.status().await?;
    info!(
        db_type = %info.database_type,
        database = %info.database,
        server_version = info.server_version.as_deref().unwrap_or("unknown"),
        autocommit = info.autocommit,
        size = status.size,
        idle = status.idle,
        max_size = status.max_size,
        "Connected"
    );

    // Round trip one connection to prove the pool hands them out
    let conn = pool.acquire().await?;
    conn.release();

    pool.destroy().await?;
    info!("Shutdown complete");
    Ok(())
}
