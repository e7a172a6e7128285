/// certscan - a perpetual certificate-search crawler
///
/// This library pages through a certificate search API, keeps the names under
/// a configured suffix and merges first-seen/last-seen timestamps into a
/// PostgreSQL domain index.
pub mod app;
pub mod config;
pub mod core;
pub mod crawler;
pub mod fetcher;
pub mod internal_metrics;
pub mod merger;
pub mod network;
pub mod normalize;
pub mod rate_limit;
pub mod store;
pub mod task_manager;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
