//! Fetching a single page of search results with bounded retry.

use crate::{
    config::CrawlConfig,
    core::{SearchPage, SearchRequest, SearchTransport},
    rate_limit::TokenBucket,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep, Instant},
};
use tracing::{debug, error, instrument, warn};

/// How often and how far apart failed attempts are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per page, including the first.
    pub max_attempts: u32,
    /// Fixed delay slept between two attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::fixed(
            config.max_attempts,
            Duration::from_secs(config.retry_interval_secs),
        )
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(360, Duration::from_secs(60))
    }
}

/// Result of fetching one page.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The API answered. The page may still carry a non-"ok" status.
    Page(SearchPage),
    /// Every attempt failed. Treated downstream as an empty page.
    Exhausted { attempts: u32 },
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// The request body could not be built. Retrying cannot help, so this is
    /// terminal for the process.
    #[error("failed to construct search request for page {page}: {source}")]
    RequestConstruction {
        page: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetch of page {page} cancelled while waiting for a rate limit permit")]
    Cancelled { page: u64 },
}

/// Issues paged search requests through the shared rate limiter, retrying
/// failed attempts according to a `RetryPolicy`.
pub struct PageFetcher {
    transport: Arc<dyn SearchTransport>,
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
    query: String,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        limiter: Arc<TokenBucket>,
        retry: RetryPolicy,
        query: String,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            query,
        }
    }

    /// Fetches `page`, waiting for a permit before every attempt.
    ///
    /// # Returns
    /// * `Ok(FetchOutcome::Page)` as soon as one attempt succeeds
    /// * `Ok(FetchOutcome::Exhausted)` after `max_attempts` failed attempts
    /// * `Err(FetchError::RequestConstruction)` if the body cannot be serialized
    /// * `Err(FetchError::Cancelled)` if `cancel` fires during a permit wait
    #[instrument(skip(self, cancel))]
    pub async fn fetch(
        &self,
        page: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<FetchOutcome, FetchError> {
        let body = SearchRequest::new(&self.query, page)
            .to_body()
            .map_err(|source| FetchError::RequestConstruction { page, source })?;

        let max_attempts = self.retry.max_attempts;
        for attempt in 1..=max_attempts {
            self.limiter
                .acquire(cancel)
                .await
                .map_err(|_| FetchError::Cancelled { page })?;

            let start = Instant::now();
            match self.transport.search(body.clone()).await {
                Ok(result) => {
                    metrics::histogram!("page_fetch_duration_seconds")
                        .record(start.elapsed().as_secs_f64());
                    metrics::counter!("pages_fetched_total").increment(1);
                    debug!(
                        attempt,
                        status = %result.status,
                        results = result.results.len(),
                        pages = result.metadata.pages,
                        "Fetched page"
                    );
                    return Ok(FetchOutcome::Page(result));
                }
                Err(e) => {
                    metrics::counter!("fetch_attempt_failures_total").increment(1);
                    warn!(attempt, max_attempts, error = %e, "Search request failed");
                    if attempt < max_attempts {
                        sleep(self.retry.delay(attempt)).await;
                    }
                }
            }
        }

        metrics::counter!("pages_exhausted_total").increment(1);
        error!(
            attempts = max_attempts,
            "Giving up on page after exhausting retries, treating it as empty"
        );
        Ok(FetchOutcome::Exhausted {
            attempts: max_attempts,
        })
    }
}
