//! Per-URL submission state machine.
//!
//! ```text
//! Pending ─► Attempting ─┬─ 2xx ──────────────► commit ledger ─► Success
//!                        ├─ 401 (first) ──────► refresh token ─► Attempting
//!                        ├─ 401 (again/last) ─► AuthFailed
//!                        ├─ 429 ──────────────► wait ─► Attempting | RateLimitedExhausted
//!                        ├─ other / transport ► wait ─► Attempting | PermanentFailure
//!                        └─ rejected ─────────► PermanentFailure
//! ```
//!
//! Every request counts against `max_attempts`, 401s included; a 401 on the
//! final attempt ends in `AuthFailed` without a refresh.
//!
//! The ledger entry is written before `Success` is reported, and only then.
//! A failed URL never stops the rest of its batch; only credential and
//! ledger errors abort.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::{ChannelError, SubmissionChannel};
use super::outcome::{BatchReport, FinalState, SubmissionOutcome};
use super::retry::RetryPolicy;
use super::throttle::Throttle;
use super::token::{CredentialError, TokenProvider};
use crate::batch::Batch;
use crate::ledger::{LedgerError, LedgerHandle};
use crate::observability::Metrics;
use crate::sitemap::UrlRecord;

/// Errors that end the whole run
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct Submitter {
    channel: Arc<dyn SubmissionChannel>,
    tokens: Arc<dyn TokenProvider>,
    ledger: LedgerHandle,
    throttle: Arc<Throttle>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl Submitter {
    pub fn new(
        channel: Arc<dyn SubmissionChannel>,
        tokens: Arc<dyn TokenProvider>,
        ledger: LedgerHandle,
        throttle: Arc<Throttle>,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channel,
            tokens,
            ledger,
            throttle,
            retry,
            metrics,
            cancel,
        }
    }

    pub fn channel(&self) -> &Arc<dyn SubmissionChannel> {
        &self.channel
    }

    /// Submit every URL of a batch in order.
    ///
    /// Stops early on cancellation; URLs not reached are listed as abandoned.
    pub async fn submit(&self, batch: &Batch) -> Result<BatchReport, SubmitError> {
        let mut report = BatchReport {
            sequence: batch.sequence,
            ..Default::default()
        };

        for (i, record) in batch.urls.iter().enumerate() {
            match self.submit_url(record).await? {
                Some(outcome) => report.outcomes.push(outcome),
                None => {
                    report
                        .abandoned
                        .extend(batch.urls[i..].iter().map(|r| r.url.clone()));
                    warn!(
                        site = %batch.site,
                        batch = batch.sequence,
                        abandoned = report.abandoned.len(),
                        "Submission cancelled"
                    );
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Drive one URL to a terminal state. `None` if cancelled first.
    pub async fn submit_url(&self, record: &UrlRecord) -> Result<Option<SubmissionOutcome>, SubmitError> {
        let mut token = self.tokens.token().await?;
        let mut refreshed = false;
        let mut attempts: u32 = 0;
        let mut waits: Vec<Duration> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let result = {
                let slot = tokio::select! {
                    slot = self.throttle.acquire() => slot,
                    _ = self.cancel.cancelled() => {
                        self.throttle.close();
                        None
                    }
                };
                let Some(_slot) = slot else {
                    return Ok(None);
                };
                attempts += 1;
                self.metrics.submission_attempted();
                self.channel.submit(record, &token).await
            };

            let (failure, detail) = match result {
                Ok(response) if response.is_success() => {
                    self.ledger.commit(&record.url, Utc::now()).await?;
                    self.metrics.submission_succeeded();
                    info!(url = %record.url, attempts, "Submitted");
                    return Ok(Some(SubmissionOutcome {
                        url: record.url.clone(),
                        final_state: FinalState::Success,
                        attempts,
                        waits,
                        detail: None,
                    }));
                }
                Ok(response) if response.status == 401 => {
                    if refreshed {
                        (FinalState::AuthFailed, "401 after token refresh".to_string())
                    } else if self.retry.exhausted(attempts) {
                        (FinalState::AuthFailed, "401 on final attempt".to_string())
                    } else {
                        refreshed = true;
                        token = self.tokens.refresh().await?;
                        self.metrics.token_refreshed();
                        debug!(url = %record.url, "Unauthorized, retrying with refreshed token");
                        continue;
                    }
                }
                Ok(response) if response.status == 429 => {
                    if self.retry.exhausted(attempts) {
                        (FinalState::RateLimitedExhausted, "429".to_string())
                    } else {
                        let wait = self.retry.rate_limit_wait(attempts, response.retry_after);
                        warn!(url = %record.url, attempts, wait = ?wait, "Rate limited, backing off");
                        waits.push(wait);
                        if !self.pause(wait).await {
                            return Ok(None);
                        }
                        continue;
                    }
                }
                Err(ChannelError::Rejected(reason)) => (FinalState::PermanentFailure, reason),
                Ok(response) => {
                    let detail = match response.detail {
                        Some(body) => format!("HTTP {}: {}", response.status, body),
                        None => format!("HTTP {}", response.status),
                    };
                    if self.retry.exhausted(attempts) {
                        (FinalState::PermanentFailure, detail)
                    } else {
                        self.back_off(record, attempts, &detail, &mut waits).await;
                        if self.cancel.is_cancelled() {
                            return Ok(None);
                        }
                        continue;
                    }
                }
                Err(e) => {
                    let detail = e.to_string();
                    if self.retry.exhausted(attempts) {
                        (FinalState::PermanentFailure, detail)
                    } else {
                        self.back_off(record, attempts, &detail, &mut waits).await;
                        if self.cancel.is_cancelled() {
                            return Ok(None);
                        }
                        continue;
                    }
                }
            };

            self.metrics.submission_failed();
            warn!(
                url = %record.url,
                attempts,
                state = %failure,
                detail = %detail,
                "Submission failed"
            );
            return Ok(Some(SubmissionOutcome {
                url: record.url.clone(),
                final_state: failure,
                attempts,
                waits,
                detail: Some(detail),
            }));
        }
    }

    async fn back_off(&self, record: &UrlRecord, attempts: u32, detail: &str, waits: &mut Vec<Duration>) {
        let wait = self.retry.backoff(attempts);
        warn!(
            url = %record.url,
            attempts,
            wait = ?wait,
            error = detail,
            "Submission attempt failed, retrying"
        );
        waits.push(wait);
        self.pause(wait).await;
    }

    /// Sleep unless cancelled first; false when cancelled
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, LedgerView, LedgerWriter};
    use crate::sitemap::SiteTarget;
    use crate::submit::channel::ChannelResponse;
    use crate::submit::token::AccessToken;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Scripted = Result<ChannelResponse, ChannelError>;

    /// Replays a fixed sequence of answers, then 200s
    struct ScriptedChannel {
        script: Mutex<VecDeque<Scripted>>,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                tokens_seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.tokens_seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SubmissionChannel for ScriptedChannel {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn submit(
            &self,
            _record: &UrlRecord,
            token: &AccessToken,
        ) -> Result<ChannelResponse, ChannelError> {
            self.tokens_seen
                .lock()
                .unwrap()
                .push(token.secret().to_string());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChannelResponse::new(200)))
        }
    }

    /// Hands out "t0", then "t1", "t2"... on each refresh
    struct CountingTokens {
        generation: Mutex<u32>,
    }

    #[async_trait]
    impl TokenProvider for CountingTokens {
        async fn token(&self) -> Result<AccessToken, CredentialError> {
            Ok(AccessToken::new(format!("t{}", self.generation.lock().unwrap())))
        }

        async fn refresh(&self) -> Result<AccessToken, CredentialError> {
            let mut generation = self.generation.lock().unwrap();
            *generation += 1;
            Ok(AccessToken::new(format!("t{}", generation)))
        }
    }

    struct Harness {
        submitter: Submitter,
        channel: Arc<ScriptedChannel>,
        ledger: LedgerHandle,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
        _temp: TempDir,
    }

    fn harness(script: Vec<Scripted>) -> Harness {
        harness_with(script, Arc::new(Throttle::new(1, Duration::ZERO)))
    }

    fn harness_with(script: Vec<Scripted>, throttle: Arc<Throttle>) -> Harness {
        let temp = TempDir::new().unwrap();
        let metrics = Arc::new(Metrics::new());
        let ledger = Ledger::load(temp.path().join("ledger.json")).unwrap();
        let (handle, _writer) = LedgerWriter::spawn(ledger, Arc::clone(&metrics));
        let channel = ScriptedChannel::new(script);
        let cancel = CancellationToken::new();

        let submitter = Submitter::new(
            channel.clone(),
            Arc::new(CountingTokens {
                generation: Mutex::new(0),
            }),
            handle.clone(),
            throttle,
            RetryPolicy::default(),
            Arc::clone(&metrics),
            cancel.clone(),
        );

        Harness {
            submitter,
            channel,
            ledger: handle,
            metrics,
            cancel,
            _temp: temp,
        }
    }

    fn record(url: &str) -> UrlRecord {
        UrlRecord {
            url: url.to_string(),
            last_modified: None,
            site: Arc::new(SiteTarget::new("a.example", "https://a.example/sitemap.xml", false)),
        }
    }

    fn status(code: u16) -> Scripted {
        Ok(ChannelResponse::new(code))
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_commits_ledger() {
        let h = harness(vec![status(200)]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::Success);
        assert_eq!(outcome.attempts, 1);
        let snapshot = h.ledger.snapshot().await.unwrap();
        assert!(snapshot.last_submitted("https://a.example/x").is_some());
        assert_eq!(h.metrics.snapshot().ledger_writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let h = harness(vec![status(429), status(429), status(429), status(200)]);
        let start = tokio::time::Instant::now();

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::Success);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.waits, secs(&[2, 4, 8]));
        assert!(start.elapsed() >= Duration::from_secs(14));
        assert_eq!(h.metrics.snapshot().ledger_writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_used() {
        let mut limited = ChannelResponse::new(429);
        limited.retry_after = Some(Duration::from_secs(5));
        let mut too_long = ChannelResponse::new(429);
        too_long.retry_after = Some(Duration::from_secs(600));
        let h = harness(vec![Ok(limited), Ok(too_long), status(200)]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();
        assert_eq!(outcome.waits, secs(&[5, 32]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion() {
        let h = harness((0..5).map(|_| status(429)).collect());

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::RateLimitedExhausted);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.waits, secs(&[2, 4, 8, 16]));
        let snapshot = h.ledger.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_refreshes_once() {
        let h = harness(vec![status(401), status(200)]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::Success);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.waits.is_empty());
        assert_eq!(*h.channel.tokens_seen.lock().unwrap(), vec!["t0", "t1"]);
        assert_eq!(h.metrics.snapshot().token_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unauthorized_is_auth_failure() {
        let h = harness(vec![status(401), status(401)]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::AuthFailed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(h.channel.calls(), 2);
        assert!(h.ledger.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_on_last_attempt_does_not_exceed_budget() {
        let h = harness(vec![
            status(429),
            status(429),
            status(429),
            status(429),
            status(401),
            status(429),
        ]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::AuthFailed);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(h.channel.calls(), 5);
        assert_eq!(h.metrics.snapshot().token_refreshes, 0);
        assert!(h.ledger.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_become_permanent_failure() {
        let h = harness((0..5).map(|_| status(500)).collect());

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::PermanentFailure);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.detail.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let h = harness(vec![Err(ChannelError::Timeout), status(200)]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::Success);
        assert_eq!(outcome.waits, secs(&[2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let h = harness(vec![Err(ChannelError::Rejected("feed missing".to_string()))]);

        let outcome = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap().unwrap();

        assert_eq!(outcome.final_state, FinalState::PermanentFailure);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(h.channel.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_url_does_not_stop_batch() {
        let h = harness((0..5).map(|_| status(429)).collect());
        let site = Arc::new(SiteTarget::new("a.example", "https://a.example/sitemap.xml", false));
        let batch = Batch {
            site,
            sequence: 0,
            urls: vec![record("https://a.example/x"), record("https://a.example/y")],
        };

        let report = h.submitter.submit(&batch).await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].final_state, FinalState::RateLimitedExhausted);
        assert_eq!(report.outcomes[1].final_state, FinalState::Success);
        assert_eq!(report.succeeded(), 1);

        let snapshot = h.ledger.snapshot().await.unwrap();
        assert!(snapshot.last_submitted("https://a.example/x").is_none());
        assert!(snapshot.last_submitted("https://a.example/y").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_spacing_closes_throttle() {
        let throttle = Arc::new(Throttle::new(1, Duration::from_secs(60)));
        let h = harness_with(Vec::new(), Arc::clone(&throttle));
        let start = tokio::time::Instant::now();

        let first = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap();
        assert!(first.is_some());

        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let second = h.submitter.submit_url(&record("https://a.example/y")).await.unwrap();

        assert!(second.is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(h.channel.calls(), 1);
        assert!(throttle.acquire().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_abandons() {
        let h = harness(vec![status(429), status(200)]);
        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        let result = h.submitter.submit_url(&record("https://a.example/x")).await.unwrap();

        assert!(result.is_none());
        assert_eq!(h.channel.calls(), 1);
        assert!(h.ledger.snapshot().await.unwrap().is_empty());
    }
}
