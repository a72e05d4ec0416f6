use super::models::{ChannelKind, Config};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No sites configured (at least one [[sites]] entry is required)")]
    NoSitesConfigured,

    #[error("Site host must not be empty")]
    EmptyHost,

    #[error("Site '{host}' is configured more than once")]
    DuplicateSite { host: String },

    #[error("Site '{host}' has an invalid root sitemap URL '{url}': {reason}")]
    InvalidSitemapUrl {
        host: String,
        url: String,
        reason: String,
    },

    #[error("Family path template must contain '{{family}}': {template}")]
    InvalidFamilyPath { template: String },

    #[error("{field} must be positive")]
    ZeroLimit { field: &'static str },

    #[error("Backoff base must be at least 1 second, got {0}")]
    InvalidBackoffBase(u64),

    #[error("Backoff cap ({cap}s) is smaller than the backoff base ({base}s)")]
    BackoffCapBelowBase { cap: u64, base: u64 },

    #[error("Feed channel requires an API key (set BING_API_KEY)")]
    MissingFeedApiKey,

    #[error("Invalid submission endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_sites(config)?;
    validate_discovery(config)?;
    validate_policy(config)?;
    validate_submission(config)?;
    validate_run(config)?;
    Ok(())
}

fn validate_sites(config: &Config) -> Result<(), ValidationError> {
    if config.sites.is_empty() {
        return Err(ValidationError::NoSitesConfigured);
    }

    let mut seen = HashSet::new();
    for site in &config.sites {
        let host = site.host.trim();
        if host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }

        if !seen.insert(host.to_lowercase()) {
            return Err(ValidationError::DuplicateSite {
                host: host.to_string(),
            });
        }

        let root = site.root_sitemap();
        match Url::parse(&root) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ValidationError::InvalidSitemapUrl {
                    host: host.to_string(),
                    url: root.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ValidationError::InvalidSitemapUrl {
                    host: host.to_string(),
                    url: root.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_discovery(config: &Config) -> Result<(), ValidationError> {
    let discovery = &config.discovery;

    let any_family_site = config.sites.iter().any(|s| s.families);
    if any_family_site && !discovery.family_path.contains("{family}") {
        return Err(ValidationError::InvalidFamilyPath {
            template: discovery.family_path.clone(),
        });
    }

    if discovery.max_concurrent_fetches == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "discovery.max_concurrent_fetches",
        });
    }

    if discovery.max_documents_per_site == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "discovery.max_documents_per_site",
        });
    }

    if discovery.fetch_timeout.is_zero() {
        return Err(ValidationError::ZeroLimit {
            field: "discovery.fetch_timeout",
        });
    }

    Ok(())
}

fn validate_policy(config: &Config) -> Result<(), ValidationError> {
    if config.policy.batch_size == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "policy.batch_size",
        });
    }

    if config.policy.reprocess_window.is_zero() {
        return Err(ValidationError::ZeroLimit {
            field: "policy.reprocess_window",
        });
    }

    Ok(())
}

fn validate_submission(config: &Config) -> Result<(), ValidationError> {
    let submission = &config.submission;

    if submission.max_attempts == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "submission.max_attempts",
        });
    }

    if submission.max_concurrent == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "submission.max_concurrent",
        });
    }

    if submission.backoff_base < 1 {
        return Err(ValidationError::InvalidBackoffBase(submission.backoff_base));
    }

    let cap = submission.backoff_cap.as_duration().as_secs();
    if cap < submission.backoff_base {
        return Err(ValidationError::BackoffCapBelowBase {
            cap,
            base: submission.backoff_base,
        });
    }

    let endpoint = submission.resolved_endpoint();
    if let Err(e) = Url::parse(&endpoint) {
        return Err(ValidationError::InvalidEndpoint {
            url: endpoint,
            reason: e.to_string(),
        });
    }

    if submission.channel == ChannelKind::Feed && submission.api_key.is_none() {
        return Err(ValidationError::MissingFeedApiKey);
    }

    Ok(())
}

fn validate_run(config: &Config) -> Result<(), ValidationError> {
    if config.run.max_concurrent_sites == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "run.max_concurrent_sites",
        });
    }

    Ok(())
}
