use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::time::Duration;

use super::store::LedgerView;
use crate::sitemap::UrlRecord;

/// Why a URL is or is not due for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    NeverSubmitted,
    /// `lastmod` is newer than the last submission
    Modified,
    /// The reprocess window has elapsed since the last submission
    WindowElapsed,
    /// Submitted recently and unchanged since
    Fresh,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        !matches!(self, Eligibility::Fresh)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Eligibility::NeverSubmitted => "never submitted",
            Eligibility::Modified => "modified since last submission",
            Eligibility::WindowElapsed => "reprocess window elapsed",
            Eligibility::Fresh => "fresh",
        };
        f.write_str(label)
    }
}

/// Decides whether a URL should be resubmitted
#[derive(Debug, Clone, Copy)]
pub struct ReprocessPolicy {
    window: TimeDelta,
}

impl ReprocessPolicy {
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn classify(
        &self,
        record: &UrlRecord,
        last_submitted: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Eligibility {
        let Some(last) = last_submitted else {
            return Eligibility::NeverSubmitted;
        };
        if record.last_modified.is_some_and(|modified| modified > last) {
            return Eligibility::Modified;
        }
        if now.signed_duration_since(last) > self.window {
            return Eligibility::WindowElapsed;
        }
        Eligibility::Fresh
    }

    pub fn eligible<L: LedgerView + ?Sized>(
        &self,
        record: &UrlRecord,
        ledger: &L,
        now: DateTime<Utc>,
    ) -> bool {
        self.classify(record, ledger.last_submitted(&record.url), now)
            .is_eligible()
    }
}
