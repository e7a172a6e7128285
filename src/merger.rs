//! Merging observed domains into the store.

use crate::core::{DomainStore, PageBatch};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Returns the registrable domain (eTLD+1) of `domain` according to the
/// public suffix list, or `None` if `domain` is itself a public suffix or is
/// otherwise not registrable.
pub fn registrable_domain(domain: &str) -> Option<&str> {
    psl::domain_str(domain)
}

/// Counts of records written and rejected while merging one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub merged: usize,
    pub failed: usize,
}

/// Applies observed timestamps to the domain index.
pub struct Merger {
    store: Arc<dyn DomainStore>,
}

impl Merger {
    pub fn new(store: Arc<dyn DomainStore>) -> Self {
        Self { store }
    }

    /// Merges a single observation.
    ///
    /// A domain whose registrable part cannot be derived is still stored,
    /// with an empty `etld`.
    #[instrument(skip(self))]
    pub async fn merge(&self, domain: &str, seen: DateTime<Utc>) -> Result<(), StoreError> {
        let etld = registrable_domain(domain).unwrap_or_else(|| {
            warn!("Couldn't determine registrable domain");
            ""
        });
        self.store.upsert(domain, etld, seen).await
    }

    /// Merges every entry of a page batch. A failed write is logged and
    /// counted; it never stops the rest of the batch.
    pub async fn merge_batch(&self, batch: &PageBatch) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (domain, seen) in batch {
            match self.merge(domain, *seen).await {
                Ok(()) => {
                    summary.merged += 1;
                    metrics::counter!("domains_merged_total").increment(1);
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::counter!("domain_merge_failures_total").increment(1);
                    error!(domain = %domain, error = %e, "Failed to insert/update domain");
                }
            }
        }
        debug!(merged = summary.merged, failed = summary.failed, "Merged page batch");
        summary
    }
}
