//! Walks a site's sitemap forest down to its leaf sitemaps.
//!
//! Discovery is breadth-first over a work queue with a visited set, so
//! self-referencing or mutually-referencing indexes are fetched once and the
//! walk always terminates. Every queued document of a wave is fetched
//! concurrently; the client's semaphore bounds the actual parallelism.
//!
//! Fetch and parse failures are logged and counted, then the document is
//! dropped. They never abort the walk.

use futures::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::fetch::SitemapClient;
use super::parser::{self, SitemapDocument};
use super::types::{LeafSitemap, SiteTarget, SitemapKind, SitemapNode};
use crate::config::DiscoveryConfig;
use crate::observability::Metrics;

/// Everything discovery learned about one site
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Leaf sitemaps in the order they were resolved
    pub leaves: Vec<LeafSitemap>,
    pub indexes: Vec<SitemapNode>,
    /// Family sitemaps that answered the HEAD probe
    pub families_found: Vec<String>,
    pub fetched: usize,
    pub fetch_errors: usize,
    pub parse_errors: usize,
    /// Walk stopped at the per-site document cap
    pub truncated: bool,
}

#[derive(Debug)]
struct Pending {
    url: String,
    /// `lastmod` the parent index gave for this document
    lastmod: Option<String>,
}

/// Resolves sitemap indexes into leaf sitemaps
pub struct SitemapDiscoverer {
    client: Arc<SitemapClient>,
    families: Vec<String>,
    family_path: String,
    max_documents: usize,
    metrics: Arc<Metrics>,
}

impl SitemapDiscoverer {
    pub fn new(client: Arc<SitemapClient>, config: &DiscoveryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            families: config.families.clone(),
            family_path: config.family_path.clone(),
            max_documents: config.max_documents_per_site.max(1),
            metrics,
        }
    }

    /// Candidate per-family sitemap URLs for a site
    pub fn family_sitemaps(&self, site: &SiteTarget) -> Vec<String> {
        let base = site.base_url();
        self.families
            .iter()
            .map(|family| format!("{}{}", base, self.family_path.replace("{family}", family)))
            .collect()
    }

    pub async fn discover(&self, site: &SiteTarget) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Pending> = VecDeque::new();

        enqueue(&mut visited, &mut queue, &site.root_sitemap, None, None);

        if site.families {
            for url in self.probe_families(site).await {
                if enqueue(&mut visited, &mut queue, &url, None, None) {
                    report.families_found.push(url);
                }
            }
        }

        while !queue.is_empty() {
            let budget = self.max_documents.saturating_sub(report.fetched + report.fetch_errors);
            if budget == 0 {
                warn!(
                    site = %site,
                    limit = self.max_documents,
                    pending = queue.len(),
                    "Sitemap document limit reached, stopping discovery"
                );
                report.truncated = true;
                break;
            }

            let take = budget.min(queue.len());
            let wave: Vec<Pending> = queue.drain(..take).collect();
            let bodies = join_all(wave.iter().map(|pending| self.client.fetch(&pending.url))).await;

            for (pending, body) in wave.into_iter().zip(bodies) {
                let body = match body {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(site = %site, url = %pending.url, error = %e, "Failed to fetch sitemap");
                        report.fetch_errors += 1;
                        self.metrics.sitemap_fetch_failed();
                        continue;
                    }
                };
                report.fetched += 1;
                self.metrics.sitemap_fetched();

                match parser::parse(&body) {
                    Ok(SitemapDocument::Index(children)) => {
                        debug!(url = %pending.url, children = children.len(), "Sitemap index");
                        for child in children {
                            enqueue(
                                &mut visited,
                                &mut queue,
                                &child.loc,
                                child.lastmod,
                                Some(&pending.url),
                            );
                        }
                        report.indexes.push(SitemapNode {
                            url: pending.url,
                            kind: SitemapKind::Index,
                        });
                    }
                    Ok(SitemapDocument::UrlSet(entries)) => {
                        debug!(url = %pending.url, entries = entries.len(), "Leaf sitemap");
                        report.leaves.push(LeafSitemap {
                            url: pending.url,
                            lastmod: pending.lastmod,
                            entries,
                        });
                    }
                    Err(e) => {
                        warn!(site = %site, url = %pending.url, error = %e, "Failed to parse sitemap");
                        report.parse_errors += 1;
                        self.metrics.sitemap_parse_failed();
                    }
                }
            }
        }

        info!(
            site = %site,
            indexes = report.indexes.len(),
            leaves = report.leaves.len(),
            fetch_errors = report.fetch_errors,
            parse_errors = report.parse_errors,
            "Discovery complete"
        );

        report
    }

    /// HEAD-probe every family sitemap; returns the ones that exist
    async fn probe_families(&self, site: &SiteTarget) -> Vec<String> {
        let candidates = self.family_sitemaps(site);
        let results = join_all(candidates.iter().map(|url| self.client.exists(url))).await;

        candidates
            .into_iter()
            .zip(results)
            .filter_map(|(url, result)| match result {
                Ok(true) => Some(url),
                Ok(false) => {
                    debug!(site = %site, url = %url, "Family sitemap not present");
                    None
                }
                Err(e) => {
                    warn!(site = %site, url = %url, error = %e, "Family sitemap probe failed");
                    None
                }
            })
            .collect()
    }
}

/// Normalized form used for the visited set: absolute, no fragment.
/// Relative references resolve against the referencing document.
fn normalize(raw: &str, parent: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(parent?).ok()?.join(raw).ok()?
        }
        Err(_) => return None,
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let mut url = parsed;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Returns false when the URL was invalid or already seen
fn enqueue(
    visited: &mut HashSet<String>,
    queue: &mut VecDeque<Pending>,
    raw: &str,
    lastmod: Option<String>,
    parent: Option<&str>,
) -> bool {
    let Some(url) = normalize(raw, parent) else {
        warn!(url = raw, "Invalid sitemap reference, skipping");
        return false;
    };
    if !visited.insert(url.clone()) {
        debug!(url = %url, "Sitemap already visited");
        return false;
    }
    queue.push_back(Pending { url, lastmod });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(" https://a.example/sitemap.xml#top ", None).as_deref(),
            Some("https://a.example/sitemap.xml")
        );
        assert_eq!(
            normalize("en/sitemap.xml", Some("https://a.example/sitemap.xml")).as_deref(),
            Some("https://a.example/en/sitemap.xml")
        );
        assert_eq!(normalize("en/sitemap.xml", None), None);
        assert_eq!(normalize("ftp://a.example/s.xml", None), None);
    }

    #[test]
    fn test_enqueue_skips_visited() {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        assert!(enqueue(&mut visited, &mut queue, "https://a.example/s.xml", None, None));
        assert!(!enqueue(&mut visited, &mut queue, "https://a.example/s.xml#x", None, None));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_family_sitemaps() {
        let client = Arc::new(SitemapClient::new(Default::default()).unwrap());
        let config = DiscoveryConfig {
            families: vec!["pdf".to_string(), "cad".to_string()],
            ..Default::default()
        };
        let discoverer = SitemapDiscoverer::new(client, &config, Arc::new(Metrics::new()));
        let site = SiteTarget::new("kb.example.net", "https://kb.example.net/sitemap.xml", true);

        assert_eq!(
            discoverer.family_sitemaps(&site),
            vec![
                "https://kb.example.net/pdf/sitemap.xml",
                "https://kb.example.net/cad/sitemap.xml",
            ]
        );
    }
}
