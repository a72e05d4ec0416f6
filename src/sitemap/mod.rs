//! Sitemap discovery and URL extraction.
//!
//! A site publishes a forest of sitemap documents: `<sitemapindex>` documents
//! point at further sitemaps, `<urlset>` documents (leaves) list pages.
//!
//! ```text
//! root sitemap ─┬─ family probes (HEAD /{family}/sitemap.xml)
//!               ▼
//!      SitemapDiscoverer ── SitemapClient (GET, shared semaphore)
//!               │
//!               ▼ leaves
//!         UrlExtractor ── lastmod parsing, sitemap-suffix filter, dedupe
//!               │
//!               ▼
//!          UrlRecord[]
//! ```

pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod parser;
pub mod types;

pub use discovery::{DiscoveryReport, SitemapDiscoverer};
pub use error::{FetchError, ParseError};
pub use extract::{parse_lastmod, UrlExtractor};
pub use fetch::{FetchConfig, SitemapClient};
pub use parser::{parse, SitemapDocument};
pub use types::{LeafSitemap, SiteTarget, SitemapEntry, SitemapKind, SitemapNode, UrlRecord};
