//! Drives the pipeline for every configured site.
//!
//! Per site: discover leaf sitemaps, extract candidates, filter them against
//! a ledger snapshot, partition into batches, then submit batch by batch. A
//! batch is finished, and the ledger flushed, before the next one starts.
//!
//! Sites run concurrently up to `run.max_concurrent_sites`; the ledger writer
//! serializes their commits. Credential and ledger errors cancel the whole
//! run. Everything else is counted in the site's report.

pub mod report;

pub use report::{RunMode, RunSummary, RunTotals, SiteReport};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::batch::{partition, Batch, PlanError, WorkPlan};
use crate::config::Config;
use crate::ledger::{LedgerError, LedgerHandle, LedgerView, ReprocessPolicy};
use crate::observability::Metrics;
use crate::sitemap::{
    FetchConfig, FetchError, SiteTarget, SitemapClient, SitemapDiscoverer, UrlExtractor, UrlRecord,
};
use crate::submit::{
    Granularity, RetryPolicy, SubmissionChannel, SubmitError, Submitter, Throttle, TokenProvider,
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to build sitemap client: {0}")]
    Client(#[from] FetchError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Work file error: {0}")]
    Plan(#[from] PlanError),

    #[error("No work file at {0}; run `prepare` first")]
    NoWorkFile(PathBuf),
}

pub struct Orchestrator {
    sites: Vec<Arc<SiteTarget>>,
    discoverer: SitemapDiscoverer,
    extractor: UrlExtractor,
    policy: ReprocessPolicy,
    batch_size: usize,
    max_concurrent_sites: usize,
    work_file: PathBuf,
    submitter: Submitter,
    ledger: LedgerHandle,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        channel: Arc<dyn SubmissionChannel>,
        tokens: Arc<dyn TokenProvider>,
        ledger: LedgerHandle,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Result<Self, RunError> {
        let client = Arc::new(SitemapClient::new(FetchConfig::from(&config.discovery))?);
        let discoverer = SitemapDiscoverer::new(client, &config.discovery, Arc::clone(&metrics));

        let submitter = Submitter::new(
            channel,
            tokens,
            ledger.clone(),
            Arc::new(Throttle::from_config(&config.submission)),
            RetryPolicy::from_config(&config.submission),
            metrics,
            cancel.clone(),
        );

        Ok(Self {
            sites: config
                .sites
                .iter()
                .map(|site| Arc::new(SiteTarget::from(site)))
                .collect(),
            discoverer,
            extractor: UrlExtractor::from_config(&config.discovery),
            policy: ReprocessPolicy::new(config.policy.reprocess_window.as_duration()),
            batch_size: config.policy.batch_size,
            max_concurrent_sites: config.run.max_concurrent_sites.max(1),
            work_file: config.ledger.work_file.clone(),
            submitter,
            ledger,
            cancel,
        })
    }

    pub fn sites(&self) -> &[Arc<SiteTarget>] {
        &self.sites
    }

    /// Discover, filter and submit every site
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::start(RunMode::Run);
        info!(run_id = %summary.run_id, sites = self.sites.len(), "Run started");

        summary.sites = self
            .across_sites(self.sites.iter().map(|site| self.run_site(Arc::clone(site))))
            .await?;

        Ok(self.finish(summary))
    }

    /// Discover and filter every site, then write the work file
    pub async fn prepare(&self) -> Result<(WorkPlan, RunSummary), RunError> {
        let mut summary = RunSummary::start(RunMode::Prepare);
        info!(run_id = %summary.run_id, sites = self.sites.len(), "Preparing work file");

        let planned = self
            .across_sites(self.sites.iter().map(|site| self.prepare_site(Arc::clone(site))))
            .await?;

        let mut plan = WorkPlan::new();
        for (report, batches) in planned {
            if !report.cancelled {
                plan.insert(&report.host, &batches);
            }
            summary.sites.push(report);
        }

        if self.cancel.is_cancelled() {
            warn!(path = %self.work_file.display(), "Run cancelled, work file not written");
        } else {
            plan.save(&self.work_file)?;
        }

        Ok((plan, self.finish(summary)))
    }

    /// Submit the batches recorded in the work file
    pub async fn submit_prepared(&self) -> Result<RunSummary, RunError> {
        let Some((plan, prepared_at)) = WorkPlan::load(&self.work_file)? else {
            return Err(RunError::NoWorkFile(self.work_file.clone()));
        };
        self.submit_plan(&plan, prepared_at).await
    }

    /// Submit a prepared plan.
    ///
    /// URLs whose ledger entry is at or after `prepared_at` were submitted by
    /// another run since the plan was made and are skipped.
    pub async fn submit_plan(
        &self,
        plan: &WorkPlan,
        prepared_at: DateTime<Utc>,
    ) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::start(RunMode::Submit);
        let sites: Vec<Arc<SiteTarget>> = plan.hosts().map(|host| self.site_for_host(host)).collect();
        info!(
            run_id = %summary.run_id,
            sites = sites.len(),
            urls = plan.url_count(),
            "Submitting work file"
        );

        summary.sites = self
            .across_sites(
                sites
                    .iter()
                    .map(|site| self.submit_planned_site(Arc::clone(site), plan, prepared_at)),
            )
            .await?;

        Ok(self.finish(summary))
    }

    fn finish(&self, mut summary: RunSummary) -> RunSummary {
        summary.finish(self.cancel.is_cancelled());
        let totals = summary.totals();
        info!(
            run_id = %summary.run_id,
            mode = %summary.mode,
            discovered = totals.discovered,
            eligible = totals.eligible,
            submitted = totals.submitted,
            failed = totals.failed,
            skipped = totals.skipped,
            abandoned = totals.abandoned,
            cancelled = summary.cancelled,
            "Run finished"
        );
        summary
    }

    /// Run site futures with bounded concurrency, results in site order.
    /// The first fatal error cancels the remaining sites.
    async fn across_sites<T, Fut>(
        &self,
        work: impl IntoIterator<Item = Fut>,
    ) -> Result<Vec<T>, RunError>
    where
        Fut: Future<Output = Result<T, RunError>>,
    {
        let cancel = &self.cancel;
        let results: Vec<Result<T, RunError>> = stream::iter(work)
            .map(|site_work| async move {
                let result = site_work.await;
                if let Err(e) = &result {
                    error!(error = %e, "Fatal error, cancelling run");
                    cancel.cancel();
                }
                result
            })
            .buffered(self.max_concurrent_sites)
            .collect()
            .await;

        results.into_iter().collect()
    }

    async fn run_site(&self, site: Arc<SiteTarget>) -> Result<SiteReport, RunError> {
        let mut report = SiteReport::new(&site.host);
        if let Some(batches) = self.plan_site(&site, &mut report).await? {
            self.submit_batches(&site, batches, &mut report).await?;
        }
        Ok(report)
    }

    async fn prepare_site(&self, site: Arc<SiteTarget>) -> Result<(SiteReport, Vec<Batch>), RunError> {
        let mut report = SiteReport::new(&site.host);
        let batches = self.plan_site(&site, &mut report).await?.unwrap_or_default();
        report.batches = batches.len();
        Ok((report, batches))
    }

    /// Discovery through partitioning. `None` when cancelled first.
    async fn plan_site(
        &self,
        site: &Arc<SiteTarget>,
        report: &mut SiteReport,
    ) -> Result<Option<Vec<Batch>>, RunError> {
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(None);
        }

        let discovery = tokio::select! {
            discovery = self.discoverer.discover(site) => discovery,
            _ = self.cancel.cancelled() => {
                report.cancelled = true;
                return Ok(None);
            }
        };
        report.record_discovery(&discovery);

        let candidates = match self.submitter.channel().granularity() {
            Granularity::Page => self.extractor.extract_all(&discovery.leaves, site),
            Granularity::Sitemap => self.extractor.feed_records(&discovery.leaves, site),
            Granularity::SitemapTree => self.extractor.sitemap_records(&discovery, site),
        };
        report.discovered = candidates.len();

        let snapshot = self.ledger.snapshot().await?;
        let now = Utc::now();
        let eligible: Vec<UrlRecord> = candidates
            .into_iter()
            .filter(|record| self.policy.eligible(record, &snapshot, now))
            .collect();
        report.eligible = eligible.len();
        report.skipped = report.discovered - report.eligible;

        let batches = partition(site, eligible, self.batch_size);
        info!(
            site = %site,
            leaves = discovery.leaves.len(),
            discovered = report.discovered,
            eligible = report.eligible,
            batches = batches.len(),
            "Site planned"
        );
        Ok(Some(batches))
    }

    async fn submit_planned_site(
        &self,
        site: Arc<SiteTarget>,
        plan: &WorkPlan,
        prepared_at: DateTime<Utc>,
    ) -> Result<SiteReport, RunError> {
        let mut report = SiteReport::new(&site.host);
        if self.cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let threshold = DateTime::from_timestamp(prepared_at.timestamp(), 0).unwrap_or(prepared_at);
        let snapshot = self.ledger.snapshot().await?;
        let mut batches = plan.batches_for(&site);

        for batch in &mut batches {
            report.discovered += batch.len();
            batch.urls.retain(|record| {
                snapshot
                    .last_submitted(&record.url)
                    .is_none_or(|at| at < threshold)
            });
        }
        batches.retain(|batch| !batch.is_empty());
        report.eligible = batches.iter().map(Batch::len).sum();
        report.skipped = report.discovered - report.eligible;

        if report.skipped > 0 {
            info!(
                site = %site,
                skipped = report.skipped,
                "Skipping URLs submitted since the work file was written"
            );
        }

        self.submit_batches(&site, batches, &mut report).await?;
        Ok(report)
    }

    async fn submit_batches(
        &self,
        site: &Arc<SiteTarget>,
        batches: Vec<Batch>,
        report: &mut SiteReport,
    ) -> Result<(), RunError> {
        if batches.is_empty() {
            return Ok(());
        }

        let verified = match self.submitter.channel().verify_site(site).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!(site = %site, error = %e, "Site verification failed");
                false
            }
        };
        if !verified {
            report.unverified = true;
            report.skipped += batches.iter().map(Batch::len).sum::<usize>();
            warn!(site = %site, "Site not verified, skipping submission");
            return Ok(());
        }

        let total = batches.len();
        let mut pending = batches.into_iter();

        while let Some(batch) = pending.next() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                report.abandoned += batch.len() + pending.by_ref().map(|b| b.len()).sum::<usize>();
                break;
            }

            let result = self.submitter.submit(&batch).await?;
            self.ledger.flush().await?;
            report.record_batch(&result);

            info!(
                site = %site,
                batch = batch.sequence + 1,
                of = total,
                succeeded = result.succeeded(),
                failed = result.failed(),
                "Batch complete"
            );

            if !result.abandoned.is_empty() {
                report.cancelled = true;
                report.abandoned += pending.by_ref().map(|b| b.len()).sum::<usize>();
                break;
            }
        }

        Ok(())
    }

    fn site_for_host(&self, host: &str) -> Arc<SiteTarget> {
        match self.sites.iter().find(|site| site.host == host) {
            Some(site) => Arc::clone(site),
            None => {
                warn!(host, "Work file names a site missing from the configuration");
                Arc::new(SiteTarget::new(host, format!("https://{}/sitemap.xml", host), false))
            }
        }
    }
}
