//! Configuration management for certscan
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to load configuration from a `scanner.toml` file and merge it
//! with environment variables.

use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Config file used when `SCANNER_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "scanner.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Connection string for the PostgreSQL store.
    pub dsn: String,
    /// How long to wait for the crawler to stop after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    /// Configuration for the search API client.
    pub api: ApiConfig,
    /// Configuration for the crawl loop.
    pub crawl: CrawlConfig,
    /// Configuration for the store connection pool.
    pub database: DatabaseConfig,
    /// Configuration for the metrics endpoint.
    pub metrics: MetricsConfig,
}

/// Configuration for the search API client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiConfig {
    /// The search endpoint URL.
    pub endpoint: String,
    /// The fixed search predicate sent with every request.
    pub query: String,
    /// Basic-auth user (API ID).
    pub username: String,
    /// Basic-auth password (API secret).
    pub password: String,
    /// Overall timeout for a single request in seconds.
    pub request_timeout_secs: u64,
    /// How long idle pooled connections are kept, in seconds.
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
}

/// Configuration for the crawl loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CrawlConfig {
    /// Names are kept only if their normalized form ends with this string.
    pub suffix: String,
    /// Maximum attempts per page before giving up on it.
    pub max_attempts: u32,
    /// Fixed delay between attempts, in seconds.
    pub retry_interval_secs: u64,
    /// Steady-state request rate, in requests per second.
    pub rate_per_second: f64,
    /// Token bucket capacity.
    pub burst: u32,
    /// Idle time after each completed pass, in seconds. Zero disables it.
    pub pass_idle_interval_secs: u64,
}

/// Configuration for the store connection pool.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Whether to apply the embedded schema migrations at startup.
    pub run_migrations: bool,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration from the specified file.
    ///
    /// Layers, lowest precedence first: built-in defaults, the TOML file,
    /// `SCANNER_`-prefixed environment variables (`__` separates nested keys,
    /// e.g. `SCANNER_CRAWL__SUFFIX`), and the two credential variables
    /// `SCANNER_CENSYS_USER` and `CENSYS_SCANNER_PASSWORD`.
    ///
    /// # Arguments
    /// * `config_path` - The path to the TOML configuration file. A missing
    ///   file is not an error.
    pub fn load(config_path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. SCANNER_DSN, SCANNER_CRAWL__MAX_ATTEMPTS
            .merge(Env::prefixed("SCANNER_").split("__"))
            .merge(Env::raw().filter_map(|key| {
                if key.as_str().eq_ignore_ascii_case("SCANNER_CENSYS_USER") {
                    Some("api.username".into())
                } else if key.as_str().eq_ignore_ascii_case("CENSYS_SCANNER_PASSWORD") {
                    Some("api.password".into())
                } else {
                    None
                }
            }))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the crawl loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.crawl.suffix.is_empty(), "crawl.suffix must not be empty");
        ensure!(self.crawl.max_attempts >= 1, "crawl.max_attempts must be at least 1");
        ensure!(
            self.crawl.rate_per_second.is_finite() && self.crawl.rate_per_second > 0.0,
            "crawl.rate_per_second must be positive"
        );
        ensure!(self.crawl.burst >= 1, "crawl.burst must be at least 1");
        ensure!(self.database.max_connections >= 1, "database.max_connections must be at least 1");
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            dsn: String::new(),
            shutdown_timeout_secs: 10,
            api: ApiConfig {
                endpoint: "https://www.censys.io/api/v1/search/certificates".to_string(),
                query: "parsed.names:au tags:trusted".to_string(),
                username: String::new(),
                password: String::new(),
                request_timeout_secs: 30 * 60,
                pool_idle_timeout_secs: 90,
                pool_max_idle_per_host: 10,
            },
            crawl: CrawlConfig::default(),
            database: DatabaseConfig {
                max_connections: 5,
                run_migrations: true,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9898)),
            },
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            suffix: ".au".to_string(),
            max_attempts: 360,
            retry_interval_secs: 60,
            rate_per_second: 0.4,
            burst: 1,
            pass_idle_interval_secs: 0,
        }
    }
}
