//! Per-URL indexing API (`urlNotifications:publish`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::channel::{bearer, read_response, ChannelError, ChannelResponse, SubmissionChannel};
use super::token::AccessToken;
use crate::sitemap::UrlRecord;

#[derive(Debug, Serialize)]
struct Notification<'a> {
    url: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Posts `{"url": ..., "type": "URL_UPDATED"}` with a bearer token
pub struct IndexingApiChannel {
    client: Client,
    endpoint: String,
}

impl IndexingApiChannel {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SubmissionChannel for IndexingApiChannel {
    fn name(&self) -> &'static str {
        "indexing"
    }

    async fn submit(
        &self,
        record: &UrlRecord,
        token: &AccessToken,
    ) -> Result<ChannelResponse, ChannelError> {
        let body = Notification {
            url: &record.url,
            kind: "URL_UPDATED",
        };

        let secret = bearer(token)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(secret)
            .json(&body)
            .send()
            .await?;

        let response = read_response(response).await;
        debug!(url = %record.url, status = response.status, "Indexing API answered");
        Ok(response)
    }
}
