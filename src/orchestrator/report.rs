use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::sitemap::DiscoveryReport;
use crate::submit::{BatchReport, FinalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Discover, filter and submit in one pass
    Run,
    /// Discover and filter, write the work file
    Prepare,
    /// Submit from the work file
    Submit,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunMode::Run => "run",
            RunMode::Prepare => "prepare",
            RunMode::Submit => "submit",
        };
        f.write_str(label)
    }
}

/// Per-site counts for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteReport {
    pub host: String,
    pub sitemaps_fetched: usize,
    pub sitemap_errors: usize,
    /// Candidate URLs after extraction and dedupe
    pub discovered: usize,
    pub eligible: usize,
    pub submitted: usize,
    pub failed: usize,
    /// Not due for submission, or already submitted since the work file was written
    pub skipped: usize,
    /// Eligible but never attempted because the run stopped
    pub abandoned: usize,
    pub batches: usize,
    pub outcomes: BTreeMap<FinalState, usize>,
    pub unverified: bool,
    pub truncated: bool,
    pub cancelled: bool,
}

impl SiteReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn record_discovery(&mut self, discovery: &DiscoveryReport) {
        self.sitemaps_fetched = discovery.fetched;
        self.sitemap_errors = discovery.fetch_errors + discovery.parse_errors;
        self.truncated = discovery.truncated;
    }

    pub fn record_batch(&mut self, batch: &BatchReport) {
        self.batches += 1;
        for outcome in &batch.outcomes {
            *self.outcomes.entry(outcome.final_state).or_default() += 1;
        }
        self.submitted += batch.succeeded();
        self.failed += batch.failed();
        self.abandoned += batch.abandoned.len();
    }
}

/// Totals across every site of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub discovered: usize,
    pub eligible: usize,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub abandoned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sites: Vec<SiteReport>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn start(mode: RunMode) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            sites: Vec::new(),
            cancelled: false,
        }
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.finished_at = Some(Utc::now());
        self.cancelled = cancelled || self.sites.iter().any(|s| s.cancelled);
    }

    pub fn totals(&self) -> RunTotals {
        self.sites.iter().fold(RunTotals::default(), |mut t, s| {
            t.discovered += s.discovered;
            t.eligible += s.eligible;
            t.submitted += s.submitted;
            t.failed += s.failed;
            t.skipped += s.skipped;
            t.abandoned += s.abandoned;
            t
        })
    }

    pub fn site(&self, host: &str) -> Option<&SiteReport> {
        self.sites.iter().find(|s| s.host == host)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({})", self.mode, self.run_id, self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(
            f,
            "{:<32} {:>8} {:>6} {:>10} {:>8} {:>9} {:>6} {:>7} {:>9}",
            "site", "sitemaps", "errors", "discovered", "eligible", "submitted", "failed", "skipped", "abandoned"
        )?;
        for site in &self.sites {
            let mut flags = Vec::new();
            if site.unverified {
                flags.push("unverified");
            }
            if site.truncated {
                flags.push("truncated");
            }
            if site.cancelled {
                flags.push("cancelled");
            }
            writeln!(
                f,
                "{:<32} {:>8} {:>6} {:>10} {:>8} {:>9} {:>6} {:>7} {:>9} {}",
                site.host,
                site.sitemaps_fetched,
                site.sitemap_errors,
                site.discovered,
                site.eligible,
                site.submitted,
                site.failed,
                site.skipped,
                site.abandoned,
                flags.join(",")
            )?;
            for (state, count) in site.outcomes.iter().filter(|(s, _)| !s.is_success()) {
                writeln!(f, "    {}: {}", state, count)?;
            }
        }
        let totals = self.totals();
        write!(
            f,
            "total: {} discovered, {} eligible, {} submitted, {} failed, {} skipped, {} abandoned{}",
            totals.discovered,
            totals.eligible,
            totals.submitted,
            totals.failed,
            totals.skipped,
            totals.abandoned,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::SubmissionOutcome;

    fn outcome(url: &str, state: FinalState) -> SubmissionOutcome {
        SubmissionOutcome {
            url: url.to_string(),
            final_state: state,
            attempts: 1,
            waits: Vec::new(),
            detail: None,
        }
    }

    #[test]
    fn test_record_batch() {
        let mut report = SiteReport::new("a.example");
        report.record_batch(&BatchReport {
            sequence: 0,
            outcomes: vec![
                outcome("https://a.example/1", FinalState::Success),
                outcome("https://a.example/2", FinalState::RateLimitedExhausted),
                outcome("https://a.example/3", FinalState::Success),
            ],
            abandoned: vec!["https://a.example/4".to_string()],
        });

        assert_eq!(report.submitted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.outcomes.get(&FinalState::Success), Some(&2));
    }

    #[test]
    fn test_totals_and_display() {
        let mut summary = RunSummary::start(RunMode::Run);
        let mut a = SiteReport::new("a.example");
        a.discovered = 10;
        a.eligible = 4;
        a.submitted = 3;
        a.failed = 1;
        a.skipped = 6;
        let mut b = SiteReport::new("b.example");
        b.discovered = 5;
        b.eligible = 5;
        b.submitted = 5;
        summary.sites = vec![a, b];
        summary.finish(false);

        let totals = summary.totals();
        assert_eq!(totals.discovered, 15);
        assert_eq!(totals.submitted, 8);
        assert!(!summary.cancelled);

        let text = summary.to_string();
        assert!(text.contains("a.example"));
        assert!(text.contains("total: 15 discovered, 9 eligible, 8 submitted"));
    }
}
