//! Per-provider pacing of submission requests.
//!
//! `acquire` may sleep out the spacing while holding the pacing lock. Dropping
//! the future releases the lock, so callers race it against their cancel
//! token and `close` the throttle once the run stops.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::SubmissionConfig;

/// Caps in-flight requests and enforces a minimum gap between request starts.
///
/// Shared by every site submitting through the same provider.
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(max_concurrent: usize, spacing: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            spacing,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self::new(config.max_concurrent, config.spacing.as_duration())
    }

    /// Wait for a free slot and for the spacing since the previous request.
    ///
    /// Returns `None` only if the throttle has been closed.
    pub async fn acquire(&self) -> Option<ThrottleGuard> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;

        {
            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.spacing {
                    tokio::time::sleep(self.spacing - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        Some(ThrottleGuard { _permit: permit })
    }

    /// Refuse further acquisitions; slot waiters get `None`
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Releases the in-flight slot when dropped
pub struct ThrottleGuard {
    _permit: OwnedSemaphorePermit,
}
