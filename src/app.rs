//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{DomainStore, SearchTransport},
    crawler::Crawler,
    fetcher::{FetchError, PageFetcher, RetryPolicy},
    internal_metrics::MetricsBuilder,
    merger::Merger,
    network::CensysClient,
    rate_limit::TokenBucket,
    store::PgDomainStore,
    task_manager::TaskManager,
};
use anyhow::{anyhow, ensure, Context, Result};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error, info, instrument, warn};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    crawler_task: JoinHandle<Result<(), FetchError>>,
    metrics_addr: Option<SocketAddr>,
    shutdown_timeout: Duration,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Runs until the shutdown signal fires or the crawler stops on its own,
    /// which only happens on a fatal error.
    pub async fn run(self) -> Result<()> {
        let App {
            task_manager,
            mut crawler_task,
            shutdown_timeout,
            ..
        } = self;
        let mut shutdown_rx = task_manager.get_shutdown_rx();

        tokio::select! {
            joined = &mut crawler_task => {
                let result = crawler_result(joined);
                task_manager.shutdown(Duration::ZERO).await;
                result
            }
            Ok(()) = shutdown_rx.changed() => {
                info!("Shutdown signal received. Waiting for the crawler to stop...");
                let result = match tokio::time::timeout(shutdown_timeout, &mut crawler_task).await {
                    Ok(joined) => crawler_result(joined),
                    Err(_) => {
                        warn!("Crawler did not stop in time, aborting it.");
                        crawler_task.abort();
                        Ok(())
                    }
                };
                task_manager.shutdown(shutdown_timeout).await;
                info!("All tasks shut down.");
                result
            }
        }
    }
}

fn crawler_result(joined: Result<Result<(), FetchError>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "Crawler stopped on a fatal error");
            Err(e.into())
        }
        Err(e) => Err(anyhow!("Crawler task panicked: {}", e)),
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap the transport and store for fakes.
pub struct AppBuilder {
    config: Config,
    transport_override: Option<Arc<dyn SearchTransport>>,
    store_override: Option<Arc<dyn DomainStore>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport_override: None,
            store_override: None,
        }
    }

    /// Overrides the search transport for testing.
    pub fn transport_override(mut self, transport: Arc<dyn SearchTransport>) -> Self {
        self.transport_override = Some(transport);
        self
    }

    /// Overrides the domain store for testing.
    pub fn store_override(mut self, store: Arc<dyn DomainStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Builds all components and spawns the crawler.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let metrics_addr = match MetricsBuilder::new(config.metrics.clone())
            .build(task_manager.get_shutdown_rx())
            .await
        {
            Some((server, addr)) => {
                info!(%addr, "Serving metrics");
                task_manager.spawn("MetricsServer", server.run());
                Some(addr)
            }
            None => None,
        };

        // =========================================================================
        // 2. Store
        // =========================================================================
        let store = match self.store_override {
            Some(store) => store,
            None => {
                ensure!(!config.dsn.is_empty(), "No database DSN configured (set SCANNER_DSN)");
                let store = PgDomainStore::connect(&config.dsn, config.database.max_connections)
                    .await
                    .context("Failed to connect to database")?;
                if config.database.run_migrations {
                    store.migrate().await.context("Failed to migrate database")?;
                }
                Arc::new(store) as Arc<dyn DomainStore>
            }
        };

        // =========================================================================
        // 3. Search transport and rate limiter
        // =========================================================================
        let transport = match self.transport_override {
            Some(transport) => transport,
            None => {
                if config.api.username.is_empty() || config.api.password.is_empty() {
                    warn!("Search API credentials are empty; requests will likely be rejected");
                }
                debug!(endpoint = %config.api.endpoint, "Initializing search API client");
                Arc::new(CensysClient::from_config(&config.api)?) as Arc<dyn SearchTransport>
            }
        };
        let limiter = Arc::new(TokenBucket::from_config(&config.crawl)?);

        // =========================================================================
        // 4. Crawler
        // =========================================================================
        let fetcher = PageFetcher::new(
            transport,
            limiter,
            RetryPolicy::from_config(&config.crawl),
            config.api.query.clone(),
        );
        let crawler = Crawler::new(
            fetcher,
            Merger::new(store),
            config.crawl.suffix.clone(),
            Duration::from_secs(config.crawl.pass_idle_interval_secs),
        );
        let crawler_task = tokio::spawn(crawler.run(task_manager.get_shutdown_rx()));

        info!("certscan initialized successfully. Crawling...");

        Ok(App {
            task_manager,
            crawler_task,
            metrics_addr,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        })
    }
}
