/// Durable record of which URLs were submitted and when
///
/// The ledger is a JSON object mapping each URL to the time of its last
/// confirmed submission. It answers one question for the pipeline: is this
/// URL due again?
///
/// ## Eligibility
///
/// A URL is eligible when any of these hold:
///
/// - it has no ledger entry
/// - its sitemap `lastmod` is strictly newer than the recorded submission
/// - the reprocess window (30 days by default) has elapsed since then
///
/// ## Writes
///
/// Entries are committed per URL, only after the provider confirms the
/// submission, by a single writer task ([`LedgerWriter`]). Each commit
/// rewrites the file via temp file + rename, so an interrupted run loses at
/// most the in-flight URL and never leaves a half-written file.
///
/// ## Usage
///
/// ```rust,ignore
/// use reindexer::ledger::{Ledger, LedgerWriter, ReprocessPolicy};
///
/// let ledger = Ledger::load("logs/processed_urls.json")?;
/// let (handle, writer) = LedgerWriter::spawn(ledger, metrics);
/// let snapshot = handle.snapshot().await?;
/// let due = policy.eligible(&record, &snapshot, Utc::now());
/// ```

pub mod error;
pub mod policy;
pub mod store;
pub mod writer;

pub use error::{LedgerError, Result};
pub use policy::{Eligibility, ReprocessPolicy};
pub use store::{
    format_timestamp, parse_timestamp, write_json_atomic, Ledger, LedgerSnapshot, LedgerStats,
    LedgerView,
};
pub use writer::{LedgerHandle, LedgerWriter};
