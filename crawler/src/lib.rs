//! HTTP page fetcher for the scrape queue.

use linkdex_core::config::FetchConfig;
use linkdex_core::{FetchError, PageFetcher, PageInfo};
use reqwest::{header, Client};
use scraper::{Html, Selector};
use std::future::Future;
use time::OffsetDateTime;

/// Failure to set up a fetcher.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("bad selector {0}")]
    Selector(String),

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Elements whose text makes up a page's searchable content.
const TEXT_ELEMENTS: &str = "p, h1, h2, h3, h4, h5, h6, li";

/// Pulls the title and the block-level text out of an HTML document.
#[derive(Clone)]
pub struct Extractor {
    title: Selector,
    blocks: Selector,
}

impl Extractor {
    pub fn new() -> Result<Self, BuildError> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| BuildError::Selector(format!("{css:?}: {e:?}")));
        Ok(Self { title: parse("head > title")?, blocks: parse(TEXT_ELEMENTS)? })
    }

    /// Returns `(title, text)`. Each matching element's text is followed by a newline, in
    /// document order.
    pub fn extract(&self, html: &str) -> (String, String) {
        let doc = Html::parse_document(html);
        let title = doc
            .select(&self.title)
            .next()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();
        let mut text = String::new();
        for block in doc.select(&self.blocks) {
            text.extend(block.text());
            text.push('\n');
        }
        (title, text)
    }
}

pub struct HttpFetcher {
    client: Client,
    extractor: Extractor,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, BuildError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, extractor: Extractor::new()? })
    }

    pub async fn fetch_page(&self, url: &str) -> Result<PageInfo, FetchError> {
        let resp = self.client.get(url).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let is_html = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map_or(true, |ct| ct.starts_with("text/html"));
        let bytes = resp.bytes().await.map_err(classify)?;

        // Non-HTML bodies keep their size and status but contribute no text.
        let (title, raw_text) = if is_html {
            self.extractor.extract(&String::from_utf8_lossy(&bytes))
        } else {
            (String::new(), String::new())
        };
        tracing::debug!(url, status = status.as_u16(), size = bytes.len(), "fetched page");
        Ok(PageInfo {
            fetched: OffsetDateTime::now_utc(),
            title,
            size: bytes.len() as u64,
            status_code: status.as_u16(),
            raw_text,
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<PageInfo, FetchError>> + Send {
        self.fetch_page(url)
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Transport(err.to_string())
    }
}
