//! Configuration management for reindexer
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use reindexer::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Harvesting {} sites", config.sites.len());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `REINDEXER__<section>__<key>`
//!
//! Examples:
//! - `REINDEXER__POLICY__BATCH_SIZE=500`
//! - `REINDEXER__POLICY__REPROCESS_WINDOW=14d`
//! - `REINDEXER__SUBMISSION__SPACING=2s`
//!
//! The feed channel API key is read from `BING_API_KEY` only.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/reindexer.toml`.
//! This can be overridden using the `REINDEXER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    ChannelKind, Config, DiscoveryConfig, LedgerConfig, LogFormat, PolicyConfig, RunConfig,
    SiteConfig, SubmissionConfig, TelemetryConfig, DEFAULT_FEED_ENDPOINT,
    DEFAULT_FEED_VERIFY_ENDPOINT, DEFAULT_INDEXING_ENDPOINT, DEFAULT_SEARCH_CONSOLE_ENDPOINT,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`REINDEXER__*`)
    /// 2. TOML file (default: `config/reindexer.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, still honouring environment overrides
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check an already-assembled configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
