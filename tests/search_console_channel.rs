//! Search Console sitemap channel against a mock endpoint.

use reindexer::ledger::{Ledger, LedgerWriter};
use reindexer::observability::Metrics;
use reindexer::sitemap::{SiteTarget, UrlRecord};
use reindexer::submit::{
    AccessToken, ChannelError, FinalState, Granularity, RetryPolicy, SearchConsoleChannel,
    StaticTokenProvider, SubmissionChannel, Submitter, Throttle,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITEMAP_PATH: &str = "/webmasters/v3/sites/https%3A%2F%2Fdocs.example.test%2F\
                            /sitemaps/https%3A%2F%2Fdocs.example.test%2Fsitemap.xml";

fn record(url: &str) -> UrlRecord {
    UrlRecord {
        url: url.to_string(),
        last_modified: None,
        site: Arc::new(SiteTarget::new(
            "docs.example.test",
            "https://docs.example.test/sitemap.xml",
            false,
        )),
    }
}

fn channel(server: &MockServer) -> SearchConsoleChannel {
    SearchConsoleChannel::new(
        format!("{}/webmasters/v3", server.uri()),
        Duration::from_secs(5),
        "reindexer-test",
    )
    .unwrap()
}

#[tokio::test]
async fn test_resubmit_puts_encoded_sitemap_path() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(SITEMAP_PATH))
        .and(header("authorization", "Bearer gsc-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel(&server);
    assert_eq!(channel.granularity(), Granularity::SitemapTree);

    let response = channel
        .submit(
            &record("https://docs.example.test/sitemap.xml"),
            &AccessToken::new("gsc-token"),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert!(response.is_success());
}

#[tokio::test]
async fn test_forbidden_property_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(SITEMAP_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("User does not have sufficient permission"))
        .expect(1)
        .mount(&server)
        .await;

    let result = channel(&server)
        .submit(
            &record("https://docs.example.test/sitemap.xml"),
            &AccessToken::new("gsc-token"),
        )
        .await;

    match result {
        Err(ChannelError::Rejected(reason)) => {
            assert!(reason.contains("https://docs.example.test/"));
            assert!(reason.contains("sufficient permission"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submitter_commits_resubmitted_sitemap() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(SITEMAP_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let metrics = Arc::new(Metrics::new());
    let ledger = Ledger::load(dir.path().join("ledger.json")).unwrap();
    let (handle, writer) = LedgerWriter::spawn(ledger, Arc::clone(&metrics));

    let submitter = Submitter::new(
        Arc::new(channel(&server)),
        Arc::new(StaticTokenProvider::new(AccessToken::new("gsc-token"))),
        handle,
        Arc::new(Throttle::new(1, Duration::ZERO)),
        RetryPolicy::default(),
        Arc::clone(&metrics),
        CancellationToken::new(),
    );

    let outcome = submitter
        .submit_url(&record("https://docs.example.test/sitemap.xml"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.final_state, FinalState::Success);
    assert_eq!(outcome.attempts, 1);

    drop(submitter);
    let ledger = writer.await.unwrap();
    assert_eq!(ledger.len(), 1);
}
