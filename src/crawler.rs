//! The pagination controller that drives the perpetual crawl.
//!
//! Each step fetches the page under the cursor, merges whatever it yielded and
//! advances the cursor. Once the cursor reaches the last page count reported
//! by the API the pass is complete and the cursor wraps back to page 1.

use crate::{
    fetcher::{FetchError, FetchOutcome, PageFetcher},
    merger::{MergeSummary, Merger},
    normalize::collect_page,
};
use std::time::Duration;
use tokio::{sync::watch, time::sleep};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Running,
    WrappingAround,
}

/// Position within the current pass. Lives only in memory; a restart begins
/// again at page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub page: u64,
    /// Total page count from the most recent decoded response. May lag the
    /// remote corpus, which keeps growing between requests.
    pub total_pages: u64,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            page: 1,
            total_pages: 0,
        }
    }
}

impl Cursor {
    /// Moves to the next page. Returns `true` when the pass is complete and
    /// the cursor has been reset to page 1.
    pub fn advance(&mut self) -> bool {
        self.page += 1;
        if self.page >= self.total_pages {
            self.page = 1;
            true
        } else {
            false
        }
    }
}

/// What happened to the page processed by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Merged(MergeSummary),
    /// The API answered with a status other than "ok"; nothing was merged.
    StatusNotOk(String),
    /// Every attempt failed; the page counted as empty.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub page: u64,
    pub outcome: PageOutcome,
    /// Whether this step completed a pass.
    pub wrapped: bool,
    pub next_page: u64,
}

pub struct Crawler {
    fetcher: PageFetcher,
    merger: Merger,
    suffix: String,
    pass_idle_interval: Duration,
    cursor: Cursor,
    state: CrawlState,
    passes_completed: u64,
}

impl Crawler {
    pub fn new(
        fetcher: PageFetcher,
        merger: Merger,
        suffix: String,
        pass_idle_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            merger,
            suffix,
            pass_idle_interval,
            cursor: Cursor::default(),
            state: CrawlState::Running,
            passes_completed: 0,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed
    }

    /// Processes the page under the cursor and advances it.
    ///
    /// Only request construction failures and cancellation are returned as
    /// errors; every other failure is absorbed into the `StepReport`.
    pub async fn step(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<StepReport, FetchError> {
        self.state = CrawlState::Running;
        let page = self.cursor.page;

        let outcome = match self.fetcher.fetch(page, cancel).await? {
            FetchOutcome::Page(result) => {
                self.cursor.total_pages = result.metadata.pages;
                if result.is_ok() {
                    let batch = collect_page(&result, &self.suffix);
                    PageOutcome::Merged(self.merger.merge_batch(&batch).await)
                } else {
                    metrics::counter!("pages_status_not_ok_total").increment(1);
                    warn!(page, status = %result.status, "Search status not ok, nothing to merge for this page");
                    PageOutcome::StatusNotOk(result.status)
                }
            }
            // Nothing to merge. The last known total is kept rather than
            // treated as zero, so an exhausted page moves the crawl on to the
            // next page instead of restarting the pass.
            FetchOutcome::Exhausted { attempts } => PageOutcome::Exhausted { attempts },
        };

        let wrapped = self.cursor.advance();
        if wrapped {
            self.state = CrawlState::WrappingAround;
            self.passes_completed += 1;
            metrics::counter!("crawl_passes_total").increment(1);
            info!(
                last_page = page,
                total_pages = self.cursor.total_pages,
                passes = self.passes_completed,
                "Reached end of results, wrapping around to page 1"
            );
        }

        Ok(StepReport {
            page,
            outcome,
            wrapped,
            next_page: self.cursor.page,
        })
    }

    /// Crawls forever.
    ///
    /// Returns `Ok(())` once `shutdown_rx` fires during a permit wait, or the
    /// fatal `FetchError::RequestConstruction`.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), FetchError> {
        info!(suffix = %self.suffix, "Crawler started");
        loop {
            match self.step(&mut shutdown_rx).await {
                Ok(report) => {
                    if report.wrapped && !self.pass_idle_interval.is_zero() {
                        info!(
                            idle_secs = self.pass_idle_interval.as_secs(),
                            "Pass complete, idling before the next one"
                        );
                        sleep(self.pass_idle_interval).await;
                    }
                }
                Err(FetchError::Cancelled { page }) => {
                    info!(page, "Crawler received shutdown signal.");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wraps_at_total() {
        let mut cursor = Cursor {
            page: 1,
            total_pages: 3,
        };
        assert!(!cursor.advance());
        assert_eq!(cursor.page, 2);
        assert!(cursor.advance());
        assert_eq!(cursor.page, 1);
    }

    #[test]
    fn test_cursor_with_unknown_total_wraps_immediately() {
        let mut cursor = Cursor::default();
        assert!(cursor.advance());
        assert_eq!(cursor.page, 1);
    }

    #[test]
    fn test_cursor_follows_growing_total() {
        let mut cursor = Cursor {
            page: 2,
            total_pages: 3,
        };
        cursor.total_pages = 10;
        assert!(!cursor.advance());
        assert_eq!(cursor.page, 3);
    }
}
