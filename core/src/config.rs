use std::time::Duration;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Interval between worklist pops.
    pub tick: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), max_retries: 3, retry_backoff: Duration::from_millis(250) }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub period: Duration,
    /// Bookmarks scraped longer ago than this are queued again.
    pub retention: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { period: Duration::from_secs(5), retention: Duration::from_secs(7 * 24 * 60 * 60) }
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Terms inserted per write transaction during a reindex.
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self { Self { batch_size: 100 } }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self { Self { limit: 10 } }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            user_agent: concat!("linkdex/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub queue: QueueConfig,
    pub scanner: ScannerConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
}
