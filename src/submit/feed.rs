//! Webmaster-tools feed API: submits whole leaf sitemaps for a verified site.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::channel::{read_response, ChannelError, ChannelResponse, Granularity, SubmissionChannel};
use super::token::AccessToken;
use crate::sitemap::{SiteTarget, UrlRecord};

#[derive(Debug, Deserialize)]
struct UserSites {
    #[serde(default)]
    d: Vec<Value>,
}

pub struct FeedChannel {
    client: Client,
    endpoint: String,
    verify_endpoint: String,
    api_key: String,
}

impl FeedChannel {
    pub fn new(
        endpoint: impl Into<String>,
        verify_endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            verify_endpoint: verify_endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// HEAD the feed before asking the provider to fetch it
    async fn accessible(&self, feed_url: &str) -> Result<bool, ChannelError> {
        let response = self.client.head(feed_url).send().await?;
        let ok = response.status() == StatusCode::OK;
        if !ok {
            warn!(feed = feed_url, status = response.status().as_u16(), "Feed not accessible");
        }
        Ok(ok)
    }
}

fn normalize_site(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Site URLs listed by the verification endpoint.
/// Entries are either bare strings or objects carrying a `Url` field.
fn listed_sites(sites: &UserSites) -> Vec<String> {
    sites
        .d
        .iter()
        .filter_map(|entry| match entry {
            Value::String(url) => Some(url.as_str()),
            Value::Object(fields) => fields.get("Url").and_then(Value::as_str),
            _ => None,
        })
        .map(normalize_site)
        .collect()
}

#[async_trait]
impl SubmissionChannel for FeedChannel {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Sitemap
    }

    async fn verify_site(&self, site: &SiteTarget) -> Result<bool, ChannelError> {
        let response = self
            .client
            .get(&self.verify_endpoint)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                site = %site,
                status = response.status().as_u16(),
                "Could not check site verification"
            );
            return Ok(false);
        }

        let sites: UserSites = response
            .json()
            .await
            .map_err(|e| ChannelError::Transport(format!("Invalid verification response: {}", e)))?;

        let wanted = normalize_site(&site.base_url());
        let verified = listed_sites(&sites).contains(&wanted);
        if verified {
            info!(site = %site, "Site verified");
        } else {
            warn!(site = %site, listed = sites.d.len(), "Site not verified for feed submission");
        }
        Ok(verified)
    }

    async fn submit(
        &self,
        record: &UrlRecord,
        _token: &AccessToken,
    ) -> Result<ChannelResponse, ChannelError> {
        if !self.accessible(&record.url).await? {
            return Err(ChannelError::Rejected(format!(
                "feed {} is not accessible",
                record.url
            )));
        }

        let payload = serde_json::json!({
            "siteUrl": record.site.base_url(),
            "feedUrl": record.url,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("apikey", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let response = read_response(response).await;
        debug!(feed = %record.url, status = response.status, "Feed API answered");
        Ok(response)
    }
}
