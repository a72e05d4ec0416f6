//! Logging setup and run counters

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info` for everything.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

/// Metrics handle for recording counters across sites
#[derive(Debug, Default)]
pub struct Metrics {
    sitemaps_fetched: AtomicU64,
    sitemap_fetch_errors: AtomicU64,
    sitemap_parse_errors: AtomicU64,
    submissions_attempted: AtomicU64,
    submissions_succeeded: AtomicU64,
    submissions_failed: AtomicU64,
    token_refreshes: AtomicU64,
    ledger_writes: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sitemap_fetched(&self) {
        self.sitemaps_fetched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sitemaps_fetched", "Metric incremented");
    }

    pub fn sitemap_fetch_failed(&self) {
        self.sitemap_fetch_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sitemap_fetch_errors", "Metric incremented");
    }

    pub fn sitemap_parse_failed(&self) {
        self.sitemap_parse_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sitemap_parse_errors", "Metric incremented");
    }

    pub fn submission_attempted(&self) {
        self.submissions_attempted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_attempted", "Metric incremented");
    }

    pub fn submission_succeeded(&self) {
        self.submissions_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_succeeded", "Metric incremented");
    }

    pub fn submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_failed", "Metric incremented");
    }

    pub fn token_refreshed(&self) {
        self.token_refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "token_refreshes", "Metric incremented");
    }

    pub fn ledger_written(&self) {
        self.ledger_writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "ledger_writes", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sitemaps_fetched: self.sitemaps_fetched.load(Ordering::Relaxed),
            sitemap_fetch_errors: self.sitemap_fetch_errors.load(Ordering::Relaxed),
            sitemap_parse_errors: self.sitemap_parse_errors.load(Ordering::Relaxed),
            submissions_attempted: self.submissions_attempted.load(Ordering::Relaxed),
            submissions_succeeded: self.submissions_succeeded.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            token_refreshes: self.token_refreshes.load(Ordering::Relaxed),
            ledger_writes: self.ledger_writes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sitemaps_fetched: u64,
    pub sitemap_fetch_errors: u64,
    pub sitemap_parse_errors: u64,
    pub submissions_attempted: u64,
    pub submissions_succeeded: u64,
    pub submissions_failed: u64,
    pub token_refreshes: u64,
    pub ledger_writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.sitemap_fetched();
        metrics.sitemap_fetched();
        metrics.ledger_written();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sitemaps_fetched, 2);
        assert_eq!(snapshot.ledger_writes, 1);
        assert_eq!(snapshot.submissions_attempted, 0);
    }
}
