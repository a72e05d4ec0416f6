use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// One web property whose sitemaps are harvested
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SiteConfig {
    /// Host name, e.g. "docs.example.net"
    pub host: String,
    /// Root sitemap URL; defaults to `https://{host}/sitemap.xml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<String>,
    /// Probe the per-family sitemap paths for this site
    #[serde(default)]
    pub families: bool,
}

impl SiteConfig {
    pub fn root_sitemap(&self) -> String {
        self.sitemap
            .clone()
            .unwrap_or_else(|| format!("https://{}/sitemap.xml", self.host.trim()))
    }
}

/// Sitemap discovery settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Family names substituted into `family_path`
    #[serde(default = "default_families")]
    pub families: Vec<String>,
    /// Path template relative to the site root; `{family}` is replaced
    #[serde(default = "default_family_path")]
    pub family_path: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: HumanDuration,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: HumanDuration,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_max_documents")]
    pub max_documents_per_site: usize,
    /// URL path suffixes that mark a sitemap document rather than a page
    #[serde(default = "default_sitemap_suffixes")]
    pub sitemap_suffixes: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            families: default_families(),
            family_path: default_family_path(),
            fetch_timeout: default_fetch_timeout(),
            probe_timeout: default_probe_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_documents_per_site: default_max_documents(),
            sitemap_suffixes: default_sitemap_suffixes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_families() -> Vec<String> {
    [
        "words", "pdf", "cells", "imaging", "barcode", "tasks", "ocr", "cad", "html", "zip",
        "page", "psd", "tex",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

fn default_family_path() -> String {
    "/{family}/sitemap.xml".to_string()
}

fn default_fetch_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_probe_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_documents() -> usize {
    10_000
}

fn default_sitemap_suffixes() -> Vec<String> {
    vec![".xml".to_string(), ".xml.gz".to_string()]
}

fn default_user_agent() -> String {
    format!("reindexer/{}", env!("CARGO_PKG_VERSION"))
}

/// Eligibility and batching policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Time after which a submitted URL becomes eligible again without a content change
    #[serde(default = "default_reprocess_window")]
    pub reprocess_window: HumanDuration,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reprocess_window: default_reprocess_window(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_reprocess_window() -> HumanDuration {
    HumanDuration::from_days(30)
}

fn default_batch_size() -> usize {
    1000
}

/// Which provider adapter delivers submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Per-URL indexing API (`URL_UPDATED` notifications)
    #[default]
    Indexing,
    /// Webmaster-tools feed API (submits leaf sitemaps)
    Feed,
    /// Search Console sitemap resubmission (every index and leaf sitemap)
    SearchConsole,
}

/// Submission endpoint and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
    #[serde(default)]
    pub channel: ChannelKind,
    /// Submission endpoint; defaults depend on `channel`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Site verification endpoint (feed channel only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_endpoint: Option<String>,
    /// Minimum spacing between consecutive submissions to one provider
    #[serde(default = "default_spacing")]
    pub spacing: HumanDuration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Exponential backoff base, in seconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_max_concurrent_submissions")]
    pub max_concurrent: usize,
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Feed API key (loaded from environment, not from config file)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::default(),
            endpoint: None,
            verify_endpoint: None,
            spacing: default_spacing(),
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            request_timeout: default_request_timeout(),
            max_concurrent: default_max_concurrent_submissions(),
            token_env: default_token_env(),
            api_key: None,
        }
    }
}

pub const DEFAULT_INDEXING_ENDPOINT: &str =
    "https://indexing.googleapis.com/v3/urlNotifications:publish";
pub const DEFAULT_FEED_ENDPOINT: &str = "https://ssl.bing.com/webmaster/api.svc/json/SubmitFeed";
pub const DEFAULT_SEARCH_CONSOLE_ENDPOINT: &str = "https://www.googleapis.com/webmasters/v3";
pub const DEFAULT_FEED_VERIFY_ENDPOINT: &str =
    "https://ssl.bing.com/webmaster/api.svc/json/GetUserSites";

impl SubmissionConfig {
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            match self.channel {
                ChannelKind::Indexing => DEFAULT_INDEXING_ENDPOINT,
                ChannelKind::Feed => DEFAULT_FEED_ENDPOINT,
                ChannelKind::SearchConsole => DEFAULT_SEARCH_CONSOLE_ENDPOINT,
            }
            .to_string()
        })
    }

    pub fn resolved_verify_endpoint(&self) -> String {
        self.verify_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_FEED_VERIFY_ENDPOINT.to_string())
    }
}

fn default_spacing() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    2
}

fn default_backoff_cap() -> HumanDuration {
    HumanDuration::from_secs(32)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_max_concurrent_submissions() -> usize {
    1
}

fn default_token_env() -> String {
    "REINDEXER_ACCESS_TOKEN".to_string()
}

/// Ledger and work file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    #[serde(default = "default_work_file")]
    pub work_file: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            work_file: default_work_file(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("logs/processed_urls.json")
}

fn default_work_file() -> PathBuf {
    PathBuf::from("logs/batches_to_submit.json")
}

/// Run-level limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrent_sites")]
    pub max_concurrent_sites: usize,
    /// Stop issuing submissions after this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<HumanDuration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sites: default_max_concurrent_sites(),
            timeout: None,
        }
    }
}

fn default_max_concurrent_sites() -> usize {
    4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log_format: LogFormat,
}
