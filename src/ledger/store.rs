use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::{LedgerError, Result};

/// Read access to last-submission times
pub trait LedgerView {
    fn last_submitted(&self, url: &str) -> Option<DateTime<Utc>>;
}

/// Point-in-time copy of the ledger, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    entries: Arc<BTreeMap<String, DateTime<Utc>>>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LedgerView for LedgerSnapshot {
    fn last_submitted(&self, url: &str) -> Option<DateTime<Utc>> {
        self.entries.get(url).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub entries: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// JSON-file ledger mapping submitted URLs to their last successful submission.
///
/// The file is a flat object `{"<url>": "<YYYY-MM-DDTHH:MM:SSZ>"}` and is
/// rewritten whole through a temp file and rename, so a crash leaves either
/// the previous or the new contents on disk.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Arc<BTreeMap<String, DateTime<Utc>>>,
}

impl Ledger {
    /// Open the ledger at `path`; a missing file is an empty ledger
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read(&path) {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Ledger loaded");
        Ok(Self {
            path,
            entries: Arc::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: Arc::clone(&self.entries),
        }
    }

    /// Record a successful submission and write the ledger to disk.
    ///
    /// If the write fails the in-memory entry is rolled back, so memory never
    /// claims more than the file does.
    pub fn commit(&mut self, url: &str, at: DateTime<Utc>) -> Result<()> {
        // Stored at second precision, matching the on-disk format
        let at = truncate_to_seconds(at);
        let previous = Arc::make_mut(&mut self.entries).insert(url.to_string(), at);

        if let Err(e) = self.persist() {
            let entries = Arc::make_mut(&mut self.entries);
            match previous {
                Some(previous) => entries.insert(url.to_string(), previous),
                None => entries.remove(url),
            };
            return Err(e);
        }

        debug!(url, at = %at, "Ledger entry committed");
        Ok(())
    }

    /// Write the full ledger atomically
    fn persist(&self) -> Result<()> {
        let encoded: BTreeMap<&str, String> = self
            .entries
            .iter()
            .map(|(url, at)| (url.as_str(), format_timestamp(*at)))
            .collect();
        write_json_atomic(&self.path, &encoded)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            entries: self.entries.len(),
            oldest: self.entries.values().min().copied(),
            newest: self.entries.values().max().copied(),
        }
    }
}

impl LedgerView for Ledger {
    fn last_submitted(&self, url: &str) -> Option<DateTime<Utc>> {
        self.entries.get(url).copied()
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, DateTime<Utc>>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, String> =
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    raw.into_iter()
        .map(|(url, value)| match parse_timestamp(&value) {
            Some(at) => Ok((url, at)),
            None => Err(LedgerError::InvalidTimestamp { url, value }),
        })
        .collect()
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 and offset-less timestamps (taken as UTC)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.strip_suffix(['Z', 'z']).unwrap_or(value);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc())
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

/// Serialize `value` as pretty JSON and replace `path` with it atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| LedgerError::Io(e.error))?;
    Ok(())
}
