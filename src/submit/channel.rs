use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use thiserror::Error;

use super::token::AccessToken;
use crate::sitemap::{SiteTarget, UrlRecord};

/// What a channel submits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Page URLs from the leaf sitemaps
    Page,
    /// Leaf sitemap URLs
    Sitemap,
    /// Every sitemap document of the site, indexes included
    SitemapTree,
}

/// Provider answer to one submission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, seconds form only
    pub retry_after: Option<Duration>,
    /// Start of the response body, for failure logs
    pub detail: Option<String>,
}

impl ChannelResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            detail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    /// Provider-side precondition failed; retrying cannot help
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChannelError::Timeout
        } else {
            ChannelError::Transport(e.to_string())
        }
    }
}

/// A search-engine submission endpoint
#[async_trait]
pub trait SubmissionChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn granularity(&self) -> Granularity {
        Granularity::Page
    }

    /// Whether the provider account may submit for this site
    async fn verify_site(&self, _site: &SiteTarget) -> Result<bool, ChannelError> {
        Ok(true)
    }

    /// Send one notification. Non-2xx answers are `Ok` with their status;
    /// the caller owns the retry decision.
    async fn submit(
        &self,
        record: &UrlRecord,
        token: &AccessToken,
    ) -> Result<ChannelResponse, ChannelError>;
}

const DETAIL_LIMIT: usize = 300;

/// Secret of a bearer token; an anonymous token cannot authenticate
pub(crate) fn bearer(token: &AccessToken) -> Result<&str, ChannelError> {
    if token.is_anonymous() {
        return Err(ChannelError::Rejected("no access token available".to_string()));
    }
    Ok(token.secret())
}

/// Status, `Retry-After` and a body excerpt for non-success answers
pub(crate) async fn read_response(response: reqwest::Response) -> ChannelResponse {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());

    let detail = if (200..300).contains(&status) {
        None
    } else {
        response
            .text()
            .await
            .ok()
            .map(|body| body.trim().chars().take(DETAIL_LIMIT).collect::<String>())
            .filter(|body| !body.is_empty())
    };

    ChannelResponse {
        status,
        retry_after,
        detail,
    }
}

pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
