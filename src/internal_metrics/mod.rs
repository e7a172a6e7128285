//! # Internal Metrics Module
//!
//! Crawl counters are recorded through the `metrics` facade at their call
//! sites. This module registers their descriptions and, when enabled,
//! installs a Prometheus recorder whose output is served by `MetricsServer`.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// Registers descriptions for every metric the crawler emits.
pub fn describe_metrics() {
    metrics::describe_counter!("pages_fetched_total", Unit::Count, "Total number of pages successfully fetched from the search API.");
    metrics::describe_counter!("fetch_attempt_failures_total", Unit::Count, "Total number of failed search attempts (transport, status or decode errors).");
    metrics::describe_counter!("pages_exhausted_total", Unit::Count, "Total number of pages given up on after exhausting retries.");
    metrics::describe_counter!("pages_status_not_ok_total", Unit::Count, "Total number of pages whose response status was not \"ok\".");
    metrics::describe_counter!("crawl_passes_total", Unit::Count, "Total number of completed crawl passes.");
    metrics::describe_counter!("domains_merged_total", Unit::Count, "Total number of domain observations merged into the store.");
    metrics::describe_counter!("domain_merge_failures_total", Unit::Count, "Total number of domain observations the store failed to write.");
    metrics::describe_histogram!("page_fetch_duration_seconds", Unit::Seconds, "Latency of successful search requests.");
}

/// Builder for the metrics system.
///
/// Responsible for initializing the `PrometheusRecorder` and binding the
/// `MetricsServer` listener.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and returns the server to spawn along
    /// with its bound address.
    ///
    /// Returns `None` if metrics are disabled or could not be set up; the
    /// crawler runs the same either way.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Option<(MetricsServer, SocketAddr)> {
        if !self.config.enabled {
            return None;
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus recorder: {}", e);
                return None;
            }
        };
        let handle = recorder.handle();

        // Bind before installing the recorder so a bad address leaves the
        // default no-op recorder in place.
        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return None;
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return None;
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return None;
        }
        describe_metrics();

        Some((MetricsServer::new(listener, handle, shutdown_rx), addr))
    }
}
