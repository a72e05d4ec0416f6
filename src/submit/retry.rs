use std::time::Duration;

use crate::config::SubmissionConfig;

/// Attempt budget and exponential backoff for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff base in seconds; the wait after attempt `n` is `base^n`
    pub base: u64,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SubmissionConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base,
            cap: config.backoff_cap.as_duration(),
        }
    }

    /// `min(cap, base^attempt)` seconds
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.base.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.cap)
    }

    /// Wait after a 429: the provider's `Retry-After` if given, capped, else backoff
    pub fn rate_limit_wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.cap),
            None => self.backoff(attempt),
        }
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..=6).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(waits, vec![2, 4, 8, 16, 32, 32]);
    }

    #[test]
    fn test_backoff_overflow_hits_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(200), Duration::from_secs(32));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_wait(1, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.rate_limit_wait(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(32)
        );
        assert_eq!(policy.rate_limit_wait(3, None), Duration::from_secs(8));
    }

    #[test]
    fn test_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.exhausted(4));
        assert!(policy.exhausted(5));
    }
}
