//! Submission of eligible URLs to search-engine endpoints.
//!
//! Provider specifics live behind [`SubmissionChannel`]; the retry, auth
//! refresh and ledger-commit rules live once in [`Submitter`].

pub mod channel;
pub mod feed;
pub mod indexing;
pub mod outcome;
pub mod retry;
pub mod search_console;
pub mod submitter;
pub mod throttle;
pub mod token;

pub use channel::{ChannelError, ChannelResponse, Granularity, SubmissionChannel};
pub use feed::FeedChannel;
pub use indexing::IndexingApiChannel;
pub use outcome::{BatchReport, FinalState, SubmissionOutcome};
pub use retry::RetryPolicy;
pub use search_console::SearchConsoleChannel;
pub use submitter::{SubmitError, Submitter};
pub use throttle::{Throttle, ThrottleGuard};
pub use token::{AccessToken, CredentialError, EnvTokenProvider, StaticTokenProvider, TokenProvider};

use std::sync::Arc;

use crate::config::{ChannelKind, Config};

/// Build the configured channel and its token source
pub fn from_config(
    config: &Config,
) -> Result<(Arc<dyn SubmissionChannel>, Arc<dyn TokenProvider>), ChannelError> {
    let submission = &config.submission;
    let timeout = submission.request_timeout.as_duration();
    let user_agent = config.discovery.user_agent.as_str();

    match submission.channel {
        ChannelKind::Indexing => {
            let channel = IndexingApiChannel::new(submission.resolved_endpoint(), timeout, user_agent)?;
            let tokens = EnvTokenProvider::new(submission.token_env.clone());
            Ok((Arc::new(channel), Arc::new(tokens)))
        }
        ChannelKind::SearchConsole => {
            let channel = SearchConsoleChannel::new(submission.resolved_endpoint(), timeout, user_agent)?;
            let tokens = EnvTokenProvider::new(submission.token_env.clone());
            Ok((Arc::new(channel), Arc::new(tokens)))
        }
        ChannelKind::Feed => {
            let api_key = submission
                .api_key
                .clone()
                .ok_or_else(|| ChannelError::Rejected("feed API key is not configured".to_string()))?;
            let channel = FeedChannel::new(
                submission.resolved_endpoint(),
                submission.resolved_verify_endpoint(),
                api_key,
                timeout,
                user_agent,
            )?;
            Ok((Arc::new(channel), Arc::new(StaticTokenProvider::anonymous())))
        }
    }
}
