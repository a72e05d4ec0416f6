use thiserror::Error;

/// Failure to retrieve a sitemap document
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Failure to interpret a fetched document as a sitemap
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document ended before the root element was closed")]
    Truncated,

    #[error("Document has no root element")]
    Empty,

    #[error("Unexpected root element <{0}> (expected <sitemapindex> or <urlset>)")]
    UnexpectedRoot(String),
}
