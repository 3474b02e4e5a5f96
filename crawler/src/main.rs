use anyhow::{anyhow, Result};
use clap::Parser;
use crawler::HttpFetcher;
use linkdex_core::config::FetchConfig;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;
use url::Url;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Fetch pages the way the scrape queue does and print them as JSON lines")]
struct Cli {
    /// URL to fetch (repeatable)
    #[arg(long)]
    url: Vec<String>,
    /// Path to a file with URLs (one per line)
    #[arg(long)]
    seeds: Option<String>,
    /// Request timeout seconds
    #[arg(long, env = "LINKDEX_FETCH_TIMEOUT", default_value_t = 5)]
    timeout_secs: u64,
    /// User-Agent string
    #[arg(long, env = "LINKDEX_USER_AGENT")]
    user_agent: Option<String>,
    /// Include extracted text in the output
    #[arg(long, default_value_t = false)]
    with_text: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut urls = args.url.clone();
    if let Some(path) = &args.seeds {
        for line in BufReader::new(File::open(path)?).lines() {
            let s = line?.trim().to_string();
            if s.is_empty() || s.starts_with('#') { continue; }
            match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{s}"))) {
                Ok(u) => urls.push(u.to_string()),
                Err(err) => tracing::warn!(seed = %s, %err, "skipping invalid seed"),
            }
        }
    }
    if urls.is_empty() { return Err(anyhow!("no urls given, use --url or --seeds")); }

    let mut config = FetchConfig { timeout: Duration::from_secs(args.timeout_secs), ..FetchConfig::default() };
    if let Some(ua) = args.user_agent { config.user_agent = ua; }
    let fetcher = HttpFetcher::new(&config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let (mut ok, mut failed) = (0usize, 0usize);
    for url in &urls {
        let line = match fetcher.fetch_page(url).await {
            Ok(info) => {
                ok += 1;
                let mut rec = serde_json::json!({
                    "url": url,
                    "title": info.title,
                    "status_code": info.status_code,
                    "size": info.size,
                    "fetched": info.fetched.format(&time::format_description::well_known::Rfc3339)?,
                });
                if args.with_text { rec["text"] = serde_json::Value::String(info.raw_text); }
                rec
            }
            Err(err) => {
                failed += 1;
                tracing::warn!(url, %err, "fetch failed");
                serde_json::json!({ "url": url, "error": err.to_string(), "status_code": err.status_code() })
            }
        };
        serde_json::to_writer(&mut out, &line)?;
        out.write_all(b"\n")?;
    }
    tracing::info!(ok, failed, "done");
    Ok(())
}
