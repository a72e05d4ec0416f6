//! Work file written by `prepare` and consumed by `submit`.
//!
//! The file maps each site host to its ordered list of batches:
//!
//! ```json
//! { "docs.example.net": [["https://docs.example.net/a", "..."], ["..."]] }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::Batch;
use crate::ledger::{write_json_atomic, LedgerError};
use crate::sitemap::{SiteTarget, UrlRecord};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Work file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to write work file: {0}")]
    Write(#[from] LedgerError),
}

/// Batches prepared for later submission, keyed by host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkPlan {
    sites: BTreeMap<String, Vec<Vec<String>>>,
}

impl WorkPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batches recorded for a site
    pub fn insert(&mut self, host: &str, batches: &[Batch]) {
        let urls = batches
            .iter()
            .map(|batch| batch.urls.iter().map(|record| record.url.clone()).collect())
            .collect();
        self.sites.insert(host.to_string(), urls);
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn url_count(&self) -> usize {
        self.sites.values().flatten().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.url_count() == 0
    }

    /// Rebuild the batches for one site, keeping their original sequence numbers
    pub fn batches_for(&self, site: &Arc<SiteTarget>) -> Vec<Batch> {
        let Some(batches) = self.sites.get(&site.host) else {
            return Vec::new();
        };
        batches
            .iter()
            .enumerate()
            .map(|(sequence, urls)| Batch {
                site: Arc::clone(site),
                sequence,
                urls: urls
                    .iter()
                    .map(|url| UrlRecord {
                        url: url.clone(),
                        last_modified: None,
                        site: Arc::clone(site),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), PlanError> {
        write_json_atomic(path, self)?;
        info!(
            path = %path.display(),
            sites = self.sites.len(),
            urls = self.url_count(),
            "Work file written"
        );
        Ok(())
    }

    /// Load the work file together with its modification time.
    ///
    /// Returns `None` when no work file exists.
    pub fn load(path: &Path) -> Result<Option<(Self, DateTime<Utc>)>, PlanError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let prepared_at: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();

        let plan = serde_json::from_slice(&bytes).map_err(|e| PlanError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Some((plan, prepared_at)))
    }
}
