//! HTTP client for sitemap documents

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use super::error::FetchError;
use crate::config::DiscoveryConfig;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Sitemap client configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    /// Concurrent sitemap requests across all sites
    pub max_concurrent: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for FetchConfig {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout.as_duration(),
            probe_timeout: config.probe_timeout.as_duration(),
            max_concurrent: config.max_concurrent_fetches.max(1),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Fetches sitemap documents with a bounded timeout and a shared concurrency cap
pub struct SitemapClient {
    client: Client,
    config: FetchConfig,
    permits: Arc<Semaphore>,
}

impl SitemapClient {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.fetch_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        let permits = Arc::new(Semaphore::new(config.max_concurrent));

        Ok(Self {
            client,
            config,
            permits,
        })
    }

    /// GET a sitemap document. Anything but 200 is an error; no retry.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::RequestFailed("fetch limiter closed".to_string()))?;

        debug!(url, "Fetching sitemap");

        let response = self
            .client
            .get(url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;

        debug!(url, size = bytes.len(), "Sitemap fetched");

        Ok(bytes)
    }

    /// HEAD probe; true only for a 200 response
    pub async fn exists(&self, url: &str) -> Result<bool> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::RequestFailed("fetch limiter closed".to_string()))?;

        let response = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let found = response.status() == StatusCode::OK;
        debug!(url, status = response.status().as_u16(), found, "Probed sitemap");
        Ok(found)
    }
}

fn map_request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_builder() {
        FetchError::InvalidUrl(e.to_string())
    } else {
        FetchError::RequestFailed(e.to_string())
    }
}
