//! Single-consumer scrape queue.
//!
//! Producers call [`QueueHandle::enqueue`], which stamps the bookmark's `last_scraped`
//! synchronously and sends its id over an unbounded channel. An intake task moves ids from
//! the channel onto the worklist; the processing loop pops one id per tick and runs
//! fetch -> store -> reindex for it. Fetches never overlap.

use crate::config::QueueConfig;
use crate::entity::{Bookmark, PageInfo};
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::library::Library;
use crate::DocId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Cloneable producer side of a [`ScrapeQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    library: Arc<Library>,
    sender: UnboundedSender<DocId>,
}

impl QueueHandle {
    /// Stamps and persists `last_scraped = now`, then hands the id to the queue. Only the
    /// stamp blocks the caller. Fails with [`Error::QueueClosed`] without stamping once the
    /// queue is gone.
    pub fn enqueue(&self, id: DocId) -> Result<Bookmark> {
        if self.sender.is_closed() {
            return Err(Error::QueueClosed);
        }
        let bookmark = self.library.stamp_scraped(id)?;
        self.sender.send(id).map_err(|_| Error::QueueClosed)?;
        Ok(bookmark)
    }
}

pub struct ScrapeQueue<F> {
    library: Arc<Library>,
    fetcher: F,
    config: QueueConfig,
    worklist: Mutex<VecDeque<DocId>>,
    handle: QueueHandle,
    inbound: tokio::sync::Mutex<UnboundedReceiver<DocId>>,
}

impl<F: PageFetcher> ScrapeQueue<F> {
    pub fn new(library: Arc<Library>, fetcher: F, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = QueueHandle { library: library.clone(), sender };
        Self {
            library,
            fetcher,
            config,
            worklist: Mutex::new(VecDeque::new()),
            handle,
            inbound: tokio::sync::Mutex::new(receiver),
        }
    }

    pub fn handle(&self) -> QueueHandle { self.handle.clone() }

    pub fn enqueue(&self, id: DocId) -> Result<Bookmark> { self.handle.enqueue(id) }

    /// Entries on the worklist, not counting ids still in the channel.
    pub fn pending(&self) -> usize { self.worklist.lock().len() }

    fn push(&self, id: DocId) {
        let len = {
            let mut worklist = self.worklist.lock();
            worklist.push_back(id);
            worklist.len()
        };
        tracing::info!(id, len, "queued scrape");
    }

    /// Moves everything already sent on the channel onto the worklist without waiting.
    /// Does nothing while the intake task owns the channel.
    pub fn accept_pending(&self) -> usize {
        let Ok(mut inbound) = self.inbound.try_lock() else { return 0 };
        let mut moved = 0;
        while let Ok(id) = inbound.try_recv() {
            self.push(id);
            moved += 1;
        }
        moved
    }

    async fn intake(&self) {
        let mut inbound = self.inbound.lock().await;
        while let Some(id) = inbound.recv().await {
            self.push(id);
        }
    }

    /// Pops the head of the worklist and processes it. `Ok(false)` when the worklist is empty.
    pub async fn process_next(&self) -> Result<bool> {
        let next = self.worklist.lock().pop_front();
        match next {
            Some(id) => {
                self.scrape_and_index(id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scrape_and_index(&self, id: DocId) -> Result<()> {
        let library = self.library.clone();
        let Some(bookmark) = self.retry("load bookmark", move || library.load_bookmark(id)).await? else {
            tracing::debug!(id, "bookmark deleted while queued");
            return Ok(());
        };
        tracing::info!(id, url = %bookmark.url, "start scrape");
        let info = match self.fetcher.fetch(&bookmark.url).await {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(id, url = %bookmark.url, %err, "fetch failed");
                PageInfo::failed(err.status_code())
            }
        };
        let status = info.status_code;
        let library = self.library.clone();
        match self.retry("apply scrape", move || library.apply_scrape(id, info.clone())).await? {
            Some(_) => tracing::info!(id, status, "scraped and indexed"),
            None => tracing::debug!(id, "bookmark deleted during scrape"),
        }
        Ok(())
    }

    /// Runs `op` on the blocking pool, retrying storage failures up to `max_retries` times
    /// with linear backoff. Other errors and the final failure are returned to the caller.
    async fn retry<T, O>(&self, what: &'static str, op: O) -> Result<T>
    where
        T: Send + 'static,
        O: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut attempt = 0;
        loop {
            let run = op.clone();
            match tokio::task::spawn_blocking(move || (*run)()).await? {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(%err, attempt, what, "storage error, retrying");
                    sleep(self.config.retry_backoff * attempt).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(%err, what, "storage error, giving up");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Runs the intake task and the processing loop until a storage error escalates.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let intake = tokio::spawn({
            let queue = self.clone();
            async move { queue.intake().await }
        });
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let result: Result<()> = loop {
            ticker.tick().await;
            if let Err(err) = self.process_next().await {
                break Err(err);
            }
        };
        intake.abort();
        result
    }
}
