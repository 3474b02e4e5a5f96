use anyhow::{anyhow, Result};
use clap::Parser;
use crawler::HttpFetcher;
use linkdex_core::{Library, ScrapeQueue, Settings, StalenessScanner};
use server::{build_app, AppState};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Database directory
    #[arg(long, env = "LINKDEX_DB", default_value = "./linkdex.db")]
    db: String,
    /// Host to bind
    #[arg(long, env = "LINKDEX_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "LINKDEX_PORT", default_value_t = 8080)]
    port: u16,
    /// Seconds between staleness scans
    #[arg(long, env = "LINKDEX_SCAN_SECS", default_value_t = 5)]
    scan_secs: u64,
    /// Days before a scraped page is fetched again
    #[arg(long, env = "LINKDEX_RETENTION_DAYS", default_value_t = 7)]
    retention_days: u64,
    /// Page fetch timeout seconds
    #[arg(long, env = "LINKDEX_FETCH_TIMEOUT", default_value_t = 5)]
    fetch_timeout_secs: u64,
    /// Maximum results per search
    #[arg(long, env = "LINKDEX_SEARCH_LIMIT", default_value_t = 10)]
    search_limit: usize,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.scanner.period = Duration::from_secs(self.scan_secs);
        settings.scanner.retention = Duration::from_secs(self.retention_days * 24 * 60 * 60);
        settings.fetch.timeout = Duration::from_secs(self.fetch_timeout_secs);
        settings.search.limit = self.search_limit;
        settings
    }
}

const STATS_PERIOD: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let settings = args.settings();

    let library = Arc::new(Library::open(&args.db, settings.clone())?);
    let fetcher = HttpFetcher::new(&settings.fetch)?;
    let queue = Arc::new(ScrapeQueue::new(library.clone(), fetcher, settings.queue.clone()));
    let scanner = StalenessScanner::new(library.clone(), queue.handle(), settings.scanner.clone());
    let app = build_app(AppState::from_env(library.clone(), queue.handle()));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, db = %args.db, bookmarks = library.store().bookmark_count(), "server listening");

    let queue_task = tokio::spawn(queue.run());
    let scanner_task = tokio::spawn(scanner.run());
    let stats_task = tokio::spawn(sample_stats(library.clone()));

    let result = tokio::select! {
        res = axum::serve(listener, app).into_future() => res.map_err(anyhow::Error::from),
        res = queue_task => res?.map_err(|e| anyhow!("scrape queue stopped: {e}")),
        res = scanner_task => res?.map_err(|e| anyhow!("staleness scanner stopped: {e}")),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };
    stats_task.abort();
    library.store().flush()?;
    result
}

/// Appends a stats sample every five minutes, starting immediately.
async fn sample_stats(library: Arc<Library>) {
    let mut ticker = tokio::time::interval(STATS_PERIOD);
    loop {
        ticker.tick().await;
        let lib = library.clone();
        match tokio::task::spawn_blocking(move || lib.update_bookmark_stats()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::warn!(%err, "could not record stats sample"),
            Err(err) => tracing::warn!(%err, "stats sample task failed"),
        }
    }
}
