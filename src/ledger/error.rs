use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ledger file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid timestamp {value:?} recorded for {url}")]
    InvalidTimestamp { url: String, value: String },

    #[error("Ledger writer has shut down")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
