//! Single-writer task serializing all ledger updates.
//!
//! Every site task talks to the ledger through a cloned [`LedgerHandle`]; the
//! writer owns the [`Ledger`] and applies commands one at a time, so two
//! sites never interleave writes to the file.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::{LedgerError, Result};
use super::store::{Ledger, LedgerSnapshot};
use crate::observability::Metrics;

const COMMAND_BUFFER: usize = 256;

enum LedgerCommand {
    Commit {
        url: String,
        at: DateTime<Utc>,
        ack: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<LedgerSnapshot>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the ledger writer
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Record a confirmed submission. Resolves once the entry is on disk.
    pub async fn commit(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(LedgerCommand::Commit {
            url: url.to_string(),
            at,
            ack,
        })
        .await?;
        rx.await.map_err(|_| LedgerError::WriterClosed)?
    }

    /// Snapshot reflecting every commit acknowledged before this call
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(LedgerCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| LedgerError::WriterClosed)
    }

    /// Barrier: resolves after every previously queued command is applied.
    ///
    /// Commits write through, so once this returns every acknowledged entry
    /// is on disk.
    pub async fn flush(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.send(LedgerCommand::Flush { ack }).await?;
        rx.await.map_err(|_| LedgerError::WriterClosed)
    }

    async fn send(&self, command: LedgerCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| LedgerError::WriterClosed)
    }
}

/// Spawns the writer task
pub struct LedgerWriter;

impl LedgerWriter {
    /// Start the writer. The task ends, returning the ledger, once every
    /// handle has been dropped.
    pub fn spawn(ledger: Ledger, metrics: Arc<Metrics>) -> (LedgerHandle, JoinHandle<Ledger>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(ledger, rx, metrics));
        (LedgerHandle { tx }, task)
    }
}

async fn run(
    mut ledger: Ledger,
    mut rx: mpsc::Receiver<LedgerCommand>,
    metrics: Arc<Metrics>,
) -> Ledger {
    info!(path = %ledger.path().display(), "Ledger writer started");

    while let Some(command) = rx.recv().await {
        match command {
            LedgerCommand::Commit { url, at, ack } => {
                // A failed commit is rolled back, so memory never runs ahead of the file
                let result = ledger.commit(&url, at);
                match &result {
                    Ok(()) => metrics.ledger_written(),
                    Err(e) => error!(url = %url, error = %e, "Failed to commit ledger entry"),
                }
                let _ = ack.send(result);
            }
            LedgerCommand::Snapshot { reply } => {
                let _ = reply.send(ledger.snapshot());
            }
            LedgerCommand::Flush { ack } => {
                debug!(entries = ledger.len(), "Ledger flushed");
                let _ = ack.send(());
            }
        }
    }

    info!(entries = ledger.len(), "Ledger writer stopped");
    ledger
}
