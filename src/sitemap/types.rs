use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::SiteConfig;

/// A web property whose sitemap forest is harvested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteTarget {
    pub host: String,
    pub root_sitemap: String,
    /// Probe the well-known per-family sitemap paths
    pub families: bool,
}

impl SiteTarget {
    pub fn new(host: impl Into<String>, root_sitemap: impl Into<String>, families: bool) -> Self {
        Self {
            host: host.into(),
            root_sitemap: root_sitemap.into(),
            families,
        }
    }

    /// Scheme + host of the root sitemap, e.g. `https://docs.example.net`
    pub fn base_url(&self) -> String {
        match url::Url::parse(&self.root_sitemap) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => format!("https://{}", self.host),
        }
    }
}

impl From<&SiteConfig> for SiteTarget {
    fn from(config: &SiteConfig) -> Self {
        Self::new(config.host.trim(), config.root_sitemap(), config.families)
    }
}

impl fmt::Display for SiteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SitemapKind {
    /// Entries point at other sitemap documents
    Index,
    /// Entries are page URLs
    Leaf,
}

/// A fetched and classified sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapNode {
    pub url: String,
    pub kind: SitemapKind,
}

/// Raw `<loc>`/`<lastmod>` pair as it appears in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<String>,
}

/// Leaf sitemap resolved by discovery, with its raw entries
#[derive(Debug, Clone)]
pub struct LeafSitemap {
    pub url: String,
    /// `lastmod` reported for this sitemap by the index that referenced it
    pub lastmod: Option<String>,
    pub entries: Vec<SitemapEntry>,
}

/// A candidate URL for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub site: Arc<SiteTarget>,
}
