//! Mailqueue Worker - drains the salted mail queue.
//!
//! This worker pulls queued messages from the configured profile's queue
//! folder and delivers each one through the profile's transport. Only one
//! worker may drain a folder at a time.

mod consumer;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailqueue::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        profiles = config.profiles.len(),
        worker_profile = %config.worker_profile,
        poll_min_ms = config.poll_interval_ms.0,
        poll_max_ms = config.poll_interval_ms.1,
        batch_size = config.batch_size,
        "config_loaded"
    );

    // Start the consumer
    consumer::run(config).await?;

    Ok(())
}
