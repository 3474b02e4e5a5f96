use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::library::Library;
use crate::queue::QueueHandle;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{interval, MissedTickBehavior};

/// Consecutive failed scans tolerated before `run` gives up.
const MAX_FAILED_SCANS: u32 = 3;

/// Periodically queues bookmarks whose content is older than the retention window.
///
/// De-duplication relies on [`QueueHandle::enqueue`] stamping `last_scraped` synchronously:
/// a queued bookmark looks fresh to the next scan.
pub struct StalenessScanner {
    library: Arc<Library>,
    queue: QueueHandle,
    config: ScannerConfig,
}

impl StalenessScanner {
    pub fn new(library: Arc<Library>, queue: QueueHandle, config: ScannerConfig) -> Self {
        Self { library, queue, config }
    }

    /// One scan. Returns how many bookmarks were queued.
    pub fn scan_once(&self) -> Result<usize> {
        let cutoff = OffsetDateTime::now_utc() - self.config.retention;
        let stale = self.library.stale_bookmarks(cutoff)?;
        if stale.is_empty() {
            tracing::debug!("none qualify");
            return Ok(0);
        }
        let mut queued = 0;
        for bookmark in stale {
            tracing::info!(id = bookmark.id, last_scraped = %bookmark.last_scraped, "queueing stale bookmark");
            match self.queue.enqueue(bookmark.id) {
                Ok(_) => queued += 1,
                // Deleted between the scan and the stamp.
                Err(Error::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(queued)
    }

    /// Scans every `period` on the blocking pool. Tolerates retryable failures until
    /// `MAX_FAILED_SCANS` happen in a row.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let scanner = Arc::new(self);
        let mut failures = 0;
        loop {
            ticker.tick().await;
            let this = scanner.clone();
            let outcome = tokio::task::spawn_blocking(move || this.scan_once()).await?;
            tolerate(outcome, &mut failures)?;
        }
    }
}

/// Resets `failures` on success. Counts a retryable failure and lets the loop continue
/// until the limit is reached; anything else ends the loop.
fn tolerate(outcome: Result<usize>, failures: &mut u32) -> Result<()> {
    match outcome {
        Ok(_) => {
            *failures = 0;
            Ok(())
        }
        Err(err) if err.is_retryable() && *failures + 1 < MAX_FAILED_SCANS => {
            *failures += 1;
            tracing::warn!(%err, failures = *failures, "staleness scan failed");
            Ok(())
        }
        Err(err) => {
            tracing::error!(%err, "staleness scan failed, stopping");
            Err(err)
        }
    }
}
