use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Terminal state of one URL's submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    Success,
    /// Still unauthorized after one token refresh
    AuthFailed,
    /// 429 on every attempt
    RateLimitedExhausted,
    PermanentFailure,
}

impl FinalState {
    pub fn is_success(self) -> bool {
        matches!(self, FinalState::Success)
    }
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FinalState::Success => "success",
            FinalState::AuthFailed => "auth_failed",
            FinalState::RateLimitedExhausted => "rate_limited_exhausted",
            FinalState::PermanentFailure => "permanent_failure",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub url: String,
    pub final_state: FinalState,
    pub attempts: u32,
    /// Backoff waits taken between attempts, in order
    pub waits: Vec<Duration>,
    /// Last status or error seen, for failures
    pub detail: Option<String>,
}

/// Result of submitting one batch
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub sequence: usize,
    pub outcomes: Vec<SubmissionOutcome>,
    /// URLs left unattempted because the run was cancelled
    pub abandoned: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.final_state.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}
