//! In-memory fakes for the transport and store seams.

use crate::{
    core::{DomainRecord, DomainStore, SearchPage, SearchTransport},
    network::TransportError,
    store::StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Fake search transport for testing.
///
/// Responses are looked up by the `page` field of the request body. Queued
/// one-shot responses for a page are served first, then the page's standing
/// response; pages with neither fail with a transport error.
#[derive(Default)]
pub struct FakeSearchTransport {
    queued: Mutex<HashMap<u64, VecDeque<Result<SearchPage, TransportError>>>>,
    pages: Mutex<HashMap<u64, SearchPage>>,
    requests: Mutex<Vec<u64>>,
}

impl FakeSearchTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for a page.
    pub fn push_response(&self, page: u64, response: Result<SearchPage, TransportError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(response);
    }

    /// Set the response returned for a page whenever nothing is queued.
    pub fn set_page(&self, page: u64, response: SearchPage) {
        self.pages.lock().unwrap().insert(page, response);
    }

    /// Page numbers of every request received, in order.
    pub fn requested_pages(&self) -> Vec<u64> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchTransport for FakeSearchTransport {
    async fn search(&self, body: Vec<u8>) -> Result<SearchPage, TransportError> {
        let request: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| TransportError::Transport(e.to_string()))?;
        let page = request["page"].as_u64().unwrap_or_default();
        self.requests.lock().unwrap().push(page);

        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        self.pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .ok_or_else(|| TransportError::Transport(format!("no response configured for page {page}")))
    }
}

/// Domain store kept in a `HashMap`, applying the same merge rule as the
/// PostgreSQL upsert.
#[derive(Default)]
pub struct MemoryDomainStore {
    records: Mutex<HashMap<String, DomainRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write for `domain` fail.
    pub fn fail_on(&self, domain: &str) {
        self.failing.lock().unwrap().insert(domain.to_string());
    }

    pub fn record(&self, domain: &str) -> Option<DomainRecord> {
        self.records.lock().unwrap().get(domain).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn upsert(&self, domain: &str, etld: &str, seen: DateTime<Utc>) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(domain) {
            return Err(StoreError::Rejected(format!("simulated failure for {domain}")));
        }

        let mut records = self.records.lock().unwrap();
        let merged = match records.get(domain) {
            Some(existing) => existing.merged(seen),
            None => DomainRecord::first_observed(domain, etld, seen),
        };
        records.insert(domain.to_string(), merged);
        Ok(())
    }

    async fn get(&self, domain: &str) -> Result<Option<DomainRecord>, StoreError> {
        Ok(self.record(domain))
    }
}
