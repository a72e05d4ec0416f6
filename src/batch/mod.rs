//! Fixed-size, ordered batches of eligible URLs.

pub mod plan;

pub use plan::{PlanError, WorkPlan};

use std::sync::Arc;

use crate::sitemap::{SiteTarget, UrlRecord};

/// Ordered group of URLs submitted as a unit of progress
#[derive(Debug, Clone)]
pub struct Batch {
    pub site: Arc<SiteTarget>,
    /// Position of this batch within the site's run, starting at 0
    pub sequence: usize,
    pub urls: Vec<UrlRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Split records into batches of at most `size`, preserving order.
///
/// A zero size is treated as one.
pub fn partition(site: &Arc<SiteTarget>, records: Vec<UrlRecord>, size: usize) -> Vec<Batch> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(size));
    let mut records = records.into_iter().peekable();

    while records.peek().is_some() {
        let urls: Vec<UrlRecord> = records.by_ref().take(size).collect();
        batches.push(Batch {
            site: Arc::clone(site),
            sequence: batches.len(),
            urls,
        });
    }
    batches
}
