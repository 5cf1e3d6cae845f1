//! # papo server
//!
//! Realtime group chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! papo
//!
//! # Run with a config file picked up from papo.toml
//! papo
//!
//! # Run with environment variables
//! PAPO_PORT=3015 PAPO_HOST=0.0.0.0 papo
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting papo server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
