//! Core domain types and service traits for certscan
//!
//! This module defines the data structures that flow through the crawl
//! pipeline and the trait contracts at its two I/O seams: the search API
//! transport and the domain store.

use crate::network::TransportError;
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fields requested from the certificate search API.
pub const NAMES_FIELD: &str = "parsed.names";
pub const VALIDITY_START_FIELD: &str = "parsed.validity.start";

/// The status string the search API reports for a usable page.
pub const STATUS_OK: &str = "ok";

/// A persisted row of the domain index.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DomainRecord {
    /// Normalized domain name, the unique key.
    pub domain: String,
    /// Registrable domain (eTLD+1). Empty when it could not be derived.
    pub etld: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DomainRecord {
    /// The record created by the first merge of a domain.
    pub fn first_observed(domain: &str, etld: &str, seen: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_string(),
            etld: etld.to_string(),
            first_seen: seen,
            last_seen: seen,
        }
    }

    /// Applies one observation to an existing record.
    ///
    /// `last_seen` is compared against the *existing* `first_seen`, not the
    /// existing `last_seen`. Stored history depends on this exact rule, so it
    /// must match the SQL upsert in `store::postgres`.
    pub fn merged(&self, seen: DateTime<Utc>) -> Self {
        Self {
            domain: self.domain.clone(),
            etld: self.etld.clone(),
            first_seen: self.first_seen.min(seen),
            last_seen: seen.max(self.first_seen),
        }
    }
}

/// One page of search results as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub metadata: SearchMetadata,
    #[serde(default)]
    pub status: String,
}

impl SearchPage {
    /// Whether the API flagged this page as usable.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// A single certificate entry within a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "parsed.names", default)]
    pub names: Vec<String>,
    #[serde(rename = "parsed.validity.start", default)]
    pub validity_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Total number of pages the API currently reports for the query.
    #[serde(default)]
    pub pages: u64,
}

/// The body of a paged search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub fields: Vec<String>,
    pub page: u64,
}

impl SearchRequest {
    /// Builds a request for `page` of the given query, asking only for names
    /// and validity start.
    pub fn new(query: &str, page: u64) -> Self {
        Self {
            query: query.to_string(),
            fields: vec![NAMES_FIELD.to_string(), VALIDITY_START_FIELD.to_string()],
            page,
        }
    }

    /// Serializes the request into a JSON body.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Normalized domain -> representative timestamp for a single page.
pub type PageBatch = BTreeMap<String, DateTime<Utc>>;

// =============================================================================
// Service Traits
// =============================================================================

/// Performs a single search request against the certificate search API.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Sends an already-serialized search request body.
    ///
    /// # Returns
    /// * `Ok(SearchPage)` when the API answered with a success status and a
    ///   decodable body, whatever its `status` field says
    /// * `Err` for transport failures, non-success statuses and bad bodies
    async fn search(&self, body: Vec<u8>) -> Result<SearchPage, TransportError>;
}

/// Persists observed domains.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Inserts the domain or merges `seen` into its existing time range.
    async fn upsert(&self, domain: &str, etld: &str, seen: DateTime<Utc>) -> Result<(), StoreError>;

    /// Looks up a single record by its domain key.
    async fn get(&self, domain: &str) -> Result<Option<DomainRecord>, StoreError>;
}
