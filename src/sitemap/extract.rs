//! Turn leaf sitemaps into candidate URL records

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::discovery::DiscoveryReport;
use super::types::{LeafSitemap, SiteTarget, SitemapEntry, UrlRecord};
use crate::config::DiscoveryConfig;

/// Extracts page URLs from leaf sitemaps, dropping sitemap references
#[derive(Debug, Clone)]
pub struct UrlExtractor {
    suffixes: Vec<String>,
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

impl UrlExtractor {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(&config.sitemap_suffixes)
    }

    /// True when the URL path ends in one of the sitemap suffixes
    pub fn is_sitemap_url(&self, raw: &str) -> bool {
        let path = match url::Url::parse(raw) {
            Ok(url) => url.path().to_ascii_lowercase(),
            Err(_) => raw
                .split(['?', '#'])
                .next()
                .unwrap_or(raw)
                .to_ascii_lowercase(),
        };
        self.suffixes.iter().any(|suffix| path.ends_with(suffix))
    }

    /// Page records of one leaf, in document order
    pub fn extract(&self, leaf: &LeafSitemap, site: &Arc<SiteTarget>) -> Vec<UrlRecord> {
        let records = self.extract_entries(&leaf.entries, site);
        debug!(
            sitemap = %leaf.url,
            entries = leaf.entries.len(),
            records = records.len(),
            "Extracted URLs"
        );
        records
    }

    /// Records from every leaf of a site, deduplicated by URL.
    ///
    /// A URL listed in several leaves keeps the position of its first
    /// occurrence and the newest `lastmod` seen.
    pub fn extract_all(&self, leaves: &[LeafSitemap], site: &Arc<SiteTarget>) -> Vec<UrlRecord> {
        let records = leaves.iter().flat_map(|leaf| self.extract(leaf, site));
        dedupe(records)
    }

    /// One record per leaf sitemap, for channels that accept whole feeds.
    ///
    /// Unlike page records these URLs are sitemap documents.
    pub fn feed_records(&self, leaves: &[LeafSitemap], site: &Arc<SiteTarget>) -> Vec<UrlRecord> {
        let records = leaves.iter().map(|leaf| UrlRecord {
            url: leaf.url.clone(),
            last_modified: leaf.lastmod.as_deref().and_then(parse_lastmod),
            site: Arc::clone(site),
        });
        dedupe(records)
    }

    /// Every sitemap document of a site: indexes first, then leaves.
    ///
    /// Index nodes carry no `lastmod` of their own, so they are always
    /// eligible once the reprocess window has passed.
    pub fn sitemap_records(&self, report: &DiscoveryReport, site: &Arc<SiteTarget>) -> Vec<UrlRecord> {
        let indexes = report.indexes.iter().map(|node| UrlRecord {
            url: node.url.clone(),
            last_modified: None,
            site: Arc::clone(site),
        });
        let leaves = self.feed_records(&report.leaves, site);
        dedupe(indexes.chain(leaves))
    }

    fn extract_entries(&self, entries: &[SitemapEntry], site: &Arc<SiteTarget>) -> Vec<UrlRecord> {
        entries
            .iter()
            .filter_map(|entry| {
                let url = entry.loc.trim();
                if url.is_empty() {
                    return None;
                }
                if self.is_sitemap_url(url) {
                    warn!(url, site = %site, "Sitemap reference inside a urlset, skipping");
                    return None;
                }
                let last_modified = entry.lastmod.as_deref().and_then(|raw| {
                    let parsed = parse_lastmod(raw);
                    if parsed.is_none() {
                        debug!(url, lastmod = raw, "Unparseable lastmod, treating as absent");
                    }
                    parsed
                });
                Some(UrlRecord {
                    url: url.to_string(),
                    last_modified,
                    site: Arc::clone(site),
                })
            })
            .collect()
    }
}

fn dedupe(records: impl Iterator<Item = UrlRecord>) -> Vec<UrlRecord> {
    let mut out: Vec<UrlRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.url) {
            Some(&position) => {
                let existing = &mut out[position];
                if record.last_modified > existing.last_modified {
                    existing.last_modified = record.last_modified;
                }
            }
            None => {
                index.insert(record.url.clone(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Parse a W3C datetime `lastmod` value.
///
/// Accepts full timestamps with or without an offset, minute precision,
/// and the reduced forms `YYYY-MM-DD`, `YYYY-MM` and `YYYY`. Values without
/// an offset are taken as UTC.
pub fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = value.strip_suffix(['Z', 'z']).unwrap_or(value);
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    let mut parts = value.splitn(2, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    if value.starts_with('-') || !(1..=9999).contains(&year) {
        return None;
    }
    let month: u32 = match parts.next() {
        Some(m) if m.len() == 2 => m.parse().ok()?,
        Some(_) => return None,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
