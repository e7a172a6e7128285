//! HTTP client for the Censys certificate search API
//!
//! This module performs the single-attempt exchange with the search endpoint:
//! authentication, status checking and response decoding. Retrying and rate
//! limiting live one level up in `fetcher`.

use crate::config::ApiConfig;
use crate::core::{SearchPage, SearchTransport};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Failure of a single search attempt. Every variant is retryable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("search request failed: {0}")]
    Transport(String),

    #[error("search API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode search response: {0}")]
    Decode(String),
}

/// Decodes a raw search response body.
///
/// # Returns
/// * `Ok(SearchPage)` for any well-formed response, including ones whose
///   `status` is not `"ok"`
/// * `Err(TransportError::Decode)` if the body is not valid JSON of the
///   expected shape
pub fn parse_page(body: &[u8]) -> Result<SearchPage, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Search transport backed by `reqwest`, authenticating with basic auth.
pub struct CensysClient {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl CensysClient {
    /// Creates a client from the API section of the configuration.
    ///
    /// The underlying connection pool is reused for the lifetime of the
    /// process.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl SearchTransport for CensysClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn search(&self, body: Vec<u8>) -> Result<SearchPage, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Transport(e.to_string()))?;
        debug!(bytes = bytes.len(), "Received search response");
        parse_page(&bytes)
    }
}
