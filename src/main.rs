//! certscan - Certificate Search Crawler
//!
//! Runs the crawl loop as a long-lived daemon. Takes no command-line
//! arguments; see `scanner.toml` and the `SCANNER_*` environment variables.

use anyhow::Result;
use certscan::{
    app::App,
    config::{Config, DEFAULT_CONFIG_PATH},
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("SCANNER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)?;

    // RUST_LOG takes precedence over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("certscan starting up...");

    info!("-------------------- Configuration --------------------");
    info!("Config File: {}", config_path);
    info!("Log Level: {}", config.log_level);
    info!("Search Endpoint: {}", config.api.endpoint);
    info!("Search Query: {}", config.api.query);
    info!("Suffix Filter: {}", config.crawl.suffix);
    info!("Max Attempts: {}", config.crawl.max_attempts);
    info!("Retry Interval: {}s", config.crawl.retry_interval_secs);
    info!(
        "Rate Limit: {}/s (burst {})",
        config.crawl.rate_per_second, config.crawl.burst
    );
    info!("Pass Idle Interval: {}s", config.crawl.pass_idle_interval_secs);
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down.");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    app.run().await
}
