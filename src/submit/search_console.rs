//! Search Console sitemap resubmission.
//!
//! `PUT {endpoint}/sites/{siteUrl}/sitemaps/{feedpath}` with a bearer token,
//! both path segments percent-encoded whole. The property is the URL-prefix
//! form of the site, e.g. `https://docs.example.net/`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::channel::{bearer, read_response, ChannelError, ChannelResponse, Granularity, SubmissionChannel};
use super::token::AccessToken;
use crate::sitemap::{SiteTarget, UrlRecord};

pub struct SearchConsoleChannel {
    client: Client,
    endpoint: String,
}

impl SearchConsoleChannel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn submit_url(&self, site: &SiteTarget, feed: &str) -> String {
        format!(
            "{}/sites/{}/sitemaps/{}",
            self.endpoint,
            encode(&property(site)),
            encode(feed)
        )
    }
}

/// URL-prefix property for a site
fn property(site: &SiteTarget) -> String {
    format!("{}/", site.base_url())
}

fn encode(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[async_trait]
impl SubmissionChannel for SearchConsoleChannel {
    fn name(&self) -> &'static str {
        "search-console"
    }

    fn granularity(&self) -> Granularity {
        Granularity::SitemapTree
    }

    async fn submit(
        &self,
        record: &UrlRecord,
        token: &AccessToken,
    ) -> Result<ChannelResponse, ChannelError> {
        let secret = bearer(token)?;
        let response = self
            .client
            .put(self.submit_url(&record.site, &record.url))
            .bearer_auth(secret)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        // No access to the property: the account must be granted it first
        if response.status() == StatusCode::FORBIDDEN {
            let response = read_response(response).await;
            warn!(site = %record.site, sitemap = %record.url, "Search Console property not accessible");
            return Err(ChannelError::Rejected(format!(
                "no access to {}: {}",
                property(&record.site),
                response.detail.unwrap_or_else(|| "HTTP 403".to_string())
            )));
        }

        let response = read_response(response).await;
        debug!(sitemap = %record.url, status = response.status, "Search Console answered");
        Ok(response)
    }
}
