//! Name normalization and suffix filtering.
//!
//! Everything here is pure: a page of raw search results goes in, a
//! deduplicated `PageBatch` comes out.

use crate::core::{PageBatch, SearchPage, SearchResult};
use tracing::trace;

/// Canonicalizes a raw certificate name.
///
/// Trailing label separators and surrounding whitespace are removed and the
/// result is lowercased. `normalize_name(normalize_name(x)) == normalize_name(x)`
/// holds for every input.
pub fn normalize_name(raw: &str) -> String {
    raw.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_start()
        .to_lowercase()
}

/// Literal suffix match on an already-normalized name.
///
/// This is not a label-boundary check: suffix `e.au` accepts `example.au`
/// even though `e.au` is not a whole label of it.
pub fn matches_suffix(name: &str, suffix: &str) -> bool {
    name.ends_with(suffix)
}

/// Folds one search result into `batch`, overwriting earlier timestamps for
/// names already present.
pub fn fold_result(batch: &mut PageBatch, result: &SearchResult, suffix: &str) {
    let Some(seen) = result.validity_start else {
        trace!(names = result.names.len(), "Skipping result without a validity start");
        return;
    };

    for raw in &result.names {
        let name = normalize_name(raw);
        if matches_suffix(&name, suffix) {
            batch.insert(name, seen);
        }
    }
}

/// Builds the per-page batch of normalized, suffix-matching names.
///
/// When a name appears in several results, the timestamp of the last one in
/// page order wins.
pub fn collect_page(page: &SearchPage, suffix: &str) -> PageBatch {
    let mut batch = PageBatch::new();
    for result in &page.results {
        fold_result(&mut batch, result, suffix);
    }
    batch
}
