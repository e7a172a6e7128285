#![allow(dead_code)]
//! Test helpers for running the full application instance.

use anyhow::Result;
use certscan::{
    app::App,
    config::Config,
    core::{DomainStore, SearchTransport},
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running instance of the application.
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: JoinHandle<Result<()>>,
}

impl TestApp {
    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;
        match timeout(timeout_duration, self.app_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
        }
    }
}

/// A builder for creating `TestApp` instances backed by fakes.
pub struct TestAppBuilder {
    pub config: Config,
    transport: Arc<dyn SearchTransport>,
    store: Arc<dyn DomainStore>,
}

impl TestAppBuilder {
    pub fn new(transport: Arc<dyn SearchTransport>, store: Arc<dyn DomainStore>) -> Self {
        let mut config = Config::default();
        config.crawl.max_attempts = 2;
        config.crawl.retry_interval_secs = 1;
        config.shutdown_timeout_secs = 5;

        Self {
            config,
            transport,
            store,
        }
    }

    pub fn with_config_modifier(mut self, modifier: impl FnOnce(&mut Config)) -> Self {
        modifier(&mut self.config);
        self
    }

    /// Builds the application and spawns its run loop.
    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = App::builder(self.config)
            .transport_override(self.transport)
            .store_override(self.store)
            .build(shutdown_rx)
            .await?;
        let app_handle = tokio::spawn(app.run());
        Ok(TestApp {
            shutdown_tx,
            app_handle,
        })
    }
}
