#![allow(dead_code)]
pub mod app;
pub mod test_metrics;

use certscan::core::{SearchMetadata, SearchPage, SearchResult};
use certscan::crawler::Crawler;
use certscan::fetcher::{PageFetcher, RetryPolicy};
use certscan::merger::Merger;
use certscan::rate_limit::TokenBucket;
use certscan::test_utils::{FakeSearchTransport, MemoryDomainStore};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_QUERY: &str = "parsed.names:au tags:trusted";

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// An "ok" page reporting `pages` in total and holding one result per entry.
pub fn ok_page(pages: u64, entries: &[(&[&str], i64)]) -> SearchPage {
    SearchPage {
        status: "ok".to_string(),
        metadata: SearchMetadata { pages },
        results: entries
            .iter()
            .map(|(names, seen)| SearchResult {
                names: names.iter().map(|n| n.to_string()).collect(),
                validity_start: Some(ts(*seen)),
            })
            .collect(),
    }
}

/// A crawler over the fakes with the production rate limit and suffix.
pub fn test_crawler(
    transport: Arc<FakeSearchTransport>,
    store: Arc<MemoryDomainStore>,
    retry: RetryPolicy,
) -> Crawler {
    let limiter = Arc::new(TokenBucket::new(0.4, 1).unwrap());
    Crawler::new(
        PageFetcher::new(transport, limiter, retry, TEST_QUERY.to_string()),
        Merger::new(store),
        ".au".to_string(),
        Duration::ZERO,
    )
}
