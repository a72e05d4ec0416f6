//! Full pipeline runs: discovery, eligibility, batching, submission and the
//! ledger, with a recording channel standing in for the search engine.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reindexer::config::{Config, HumanDuration, SiteConfig};
use reindexer::ledger::{Ledger, LedgerView, LedgerWriter};
use reindexer::observability::Metrics;
use reindexer::orchestrator::{Orchestrator, RunError, RunSummary};
use reindexer::sitemap::UrlRecord;
use reindexer::submit::{
    AccessToken, ChannelError, ChannelResponse, EnvTokenProvider, StaticTokenProvider,
    SubmissionChannel, SubmitError, TokenProvider,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "docs.example.test";

/// Accepts everything and remembers what it was sent.
/// Optionally cancels the run after a number of submissions.
struct RecordingChannel {
    submitted: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            cancel_after: None,
        })
    }

    fn cancelling_after(count: usize, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            cancel_after: Some((count, cancel)),
        })
    }

    fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn submit(
        &self,
        record: &UrlRecord,
        _token: &AccessToken,
    ) -> Result<ChannelResponse, ChannelError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(record.url.clone());
        if let Some((count, cancel)) = &self.cancel_after {
            if submitted.len() >= *count {
                cancel.cancel();
            }
        }
        Ok(ChannelResponse::new(200))
    }
}

fn urlset(entries: &[(&str, Option<&str>)]) -> String {
    let body: String = entries
        .iter()
        .map(|(loc, lastmod)| match lastmod {
            Some(lastmod) => format!("<url><loc>{loc}</loc><lastmod>{lastmod}</lastmod></url>"),
            None => format!("<url><loc>{loc}</loc></url>"),
        })
        .collect();
    format!(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{body}</urlset>"#)
}

fn pages(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("https://{HOST}/page-{i}")).collect()
}

async fn sitemap_server(entries: &[(&str, Option<&str>)]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(entries)))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.sites.push(SiteConfig {
        host: HOST.to_string(),
        sitemap: Some(format!("{}/sitemap.xml", server.uri())),
        families: false,
    });
    config.policy.batch_size = 2;
    config.submission.spacing = HumanDuration::from_secs(0);
    config.ledger.path = dir.path().join("processed_urls.json");
    config.ledger.work_file = dir.path().join("batches_to_submit.json");
    config
}

enum Stage {
    Run,
    Prepare,
    Submit,
}

async fn execute(
    config: &Config,
    channel: Arc<dyn SubmissionChannel>,
    tokens: Arc<dyn TokenProvider>,
    cancel: CancellationToken,
    stage: Stage,
) -> Result<RunSummary, RunError> {
    let metrics = Arc::new(Metrics::new());
    let ledger = Ledger::load(&config.ledger.path).unwrap();
    let (handle, writer) = LedgerWriter::spawn(ledger, Arc::clone(&metrics));

    let orchestrator = Orchestrator::new(config, channel, tokens, handle, metrics, cancel).unwrap();
    let result = match stage {
        Stage::Run => orchestrator.run().await,
        Stage::Prepare => orchestrator.prepare().await.map(|(_, summary)| summary),
        Stage::Submit => orchestrator.submit_prepared().await,
    };

    drop(orchestrator);
    writer.await.unwrap();
    result
}

async fn run(config: &Config, channel: Arc<dyn SubmissionChannel>) -> RunSummary {
    execute(
        config,
        channel,
        Arc::new(StaticTokenProvider::new(AccessToken::new("token"))),
        CancellationToken::new(),
        Stage::Run,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_run_submits_then_skips_on_rerun() {
    let urls = pages(5);
    let entries: Vec<(&str, Option<&str>)> = urls.iter().map(|u| (u.as_str(), None)).collect();
    let server = sitemap_server(&entries).await;
    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);

    let channel = RecordingChannel::new();
    let summary = run(&config, channel.clone()).await;

    assert_eq!(channel.submitted(), urls);
    let site = summary.site(HOST).unwrap();
    assert_eq!(site.discovered, 5);
    assert_eq!(site.submitted, 5);
    assert_eq!(site.batches, 3);

    let ledger = Ledger::load(&config.ledger.path).unwrap();
    assert_eq!(ledger.len(), 5);

    let channel = RecordingChannel::new();
    let summary = run(&config, channel.clone()).await;

    assert!(channel.submitted().is_empty());
    let site = summary.site(HOST).unwrap();
    assert_eq!(site.eligible, 0);
    assert_eq!(site.skipped, 5);
}

#[tokio::test]
async fn test_interrupted_run_resumes_with_remaining_batch() {
    let urls = pages(5);
    let entries: Vec<(&str, Option<&str>)> = urls.iter().map(|u| (u.as_str(), None)).collect();
    let server = sitemap_server(&entries).await;
    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);

    // Stop after the second of three batches
    let cancel = CancellationToken::new();
    let channel = RecordingChannel::cancelling_after(4, cancel.clone());
    let summary = execute(
        &config,
        channel.clone(),
        Arc::new(StaticTokenProvider::anonymous()),
        cancel,
        Stage::Run,
    )
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(channel.submitted(), urls[..4].to_vec());
    assert_eq!(summary.site(HOST).unwrap().abandoned, 1);

    let ledger = Ledger::load(&config.ledger.path).unwrap();
    assert_eq!(ledger.len(), 4);
    assert!(ledger.last_submitted(&urls[4]).is_none());

    let channel = RecordingChannel::new();
    let summary = run(&config, channel.clone()).await;

    assert_eq!(channel.submitted(), vec![urls[4].clone()]);
    assert!(!summary.cancelled);
    assert_eq!(Ledger::load(&config.ledger.path).unwrap().len(), 5);
}

#[tokio::test]
async fn test_modified_pages_are_resubmitted_within_window() {
    let changed = format!("https://{HOST}/changed");
    let unchanged = format!("https://{HOST}/unchanged");
    let server = sitemap_server(&[
        (changed.as_str(), Some("2021-06-01")),
        (unchanged.as_str(), Some("2019-06-01")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let mut config = config(&server, &dir);
    config.policy.reprocess_window = HumanDuration::from_days(365_000);

    let mut ledger = Ledger::load(&config.ledger.path).unwrap();
    let submitted_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    ledger.commit(&changed, submitted_at).unwrap();
    ledger.commit(&unchanged, submitted_at).unwrap();

    let channel = RecordingChannel::new();
    let summary = run(&config, channel.clone()).await;

    assert_eq!(channel.submitted(), vec![changed.clone()]);
    assert_eq!(summary.site(HOST).unwrap().skipped, 1);

    let ledger = Ledger::load(&config.ledger.path).unwrap();
    assert!(ledger.last_submitted(&changed).unwrap() > submitted_at);
    assert_eq!(ledger.last_submitted(&unchanged), Some(submitted_at));
}

#[tokio::test]
async fn test_prepare_then_submit() {
    let urls = pages(3);
    let entries: Vec<(&str, Option<&str>)> = urls.iter().map(|u| (u.as_str(), None)).collect();
    let server = sitemap_server(&entries).await;
    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);

    let channel = RecordingChannel::new();
    let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::anonymous());
    execute(&config, channel.clone(), Arc::clone(&tokens), CancellationToken::new(), Stage::Prepare)
        .await
        .unwrap();

    assert!(channel.submitted().is_empty());
    let work: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&config.ledger.work_file).unwrap()).unwrap();
    assert_eq!(
        work,
        serde_json::json!({ HOST: [[urls[0], urls[1]], [urls[2]]] })
    );

    // Another run submits one of the URLs after the work file was written
    let mut ledger = Ledger::load(&config.ledger.path).unwrap();
    ledger.commit(&urls[1], Utc::now()).unwrap();

    let summary = execute(&config, channel.clone(), tokens, CancellationToken::new(), Stage::Submit)
        .await
        .unwrap();

    assert_eq!(channel.submitted(), vec![urls[0].clone(), urls[2].clone()]);
    let site = summary.site(HOST).unwrap();
    assert_eq!(site.submitted, 2);
    assert_eq!(site.skipped, 1);
    assert_eq!(Ledger::load(&config.ledger.path).unwrap().len(), 3);
}

#[tokio::test]
async fn test_submit_without_work_file_fails() {
    let server = sitemap_server(&[]).await;
    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);

    let result = execute(
        &config,
        RecordingChannel::new(),
        Arc::new(StaticTokenProvider::anonymous()),
        CancellationToken::new(),
        Stage::Submit,
    )
    .await;

    assert!(matches!(result, Err(RunError::NoWorkFile(_))));
}

#[tokio::test]
async fn test_missing_credentials_abort_the_run() {
    let urls = pages(2);
    let entries: Vec<(&str, Option<&str>)> = urls.iter().map(|u| (u.as_str(), None)).collect();
    let server = sitemap_server(&entries).await;
    let dir = TempDir::new().unwrap();
    let config = config(&server, &dir);

    let channel = RecordingChannel::new();
    let result = execute(
        &config,
        channel.clone(),
        Arc::new(EnvTokenProvider::new("REINDEXER_PIPELINE_TEST_TOKEN_UNSET")),
        CancellationToken::new(),
        Stage::Run,
    )
    .await;

    assert!(matches!(
        result,
        Err(RunError::Submit(SubmitError::Credentials(_)))
    ));
    assert!(channel.submitted().is_empty());
    assert!(Ledger::load(&config.ledger.path).unwrap().is_empty());
}
