use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

/// Content extracted by the last scrape of a bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub fetched: OffsetDateTime,
    pub title: String,
    pub size: u64,
    /// HTTP status of the fetch, 0 when no response arrived.
    pub status_code: u16,
    pub raw_text: String,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self { fetched: OffsetDateTime::UNIX_EPOCH, title: String::new(), size: 0, status_code: 0, raw_text: String::new() }
    }
}

impl PageInfo {
    /// Page info for a fetch that produced no usable content.
    pub fn failed(status_code: u16) -> Self {
        Self { fetched: OffsetDateTime::now_utc(), status_code, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: DocId,
    pub url: String,
    pub info: PageInfo,
    pub tags: Vec<String>,
    /// Keep `info.title` across scrapes; set when the user overrides the title.
    pub preserve_title: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_scraped: OffsetDateTime,
}

impl Bookmark {
    pub fn new(url: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            info: PageInfo::default(),
            tags: cleanup_tags(&tags),
            preserve_title: false,
            created: OffsetDateTime::UNIX_EPOCH,
            last_scraped: OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// The page title, or the URL for pages without one.
    pub fn display_title(&self) -> &str {
        if self.info.title.trim().is_empty() { &self.url } else { &self.info.title }
    }
}

/// User edits applied by `Library::edit_bookmark`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmarkEdit {
    /// `Some` overrides the scraped title and preserves it across scrapes; `None` clears the override.
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Normalize user supplied tags: split on commas, trim, lowercase, dedupe, sort.
pub fn cleanup_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref();
        if tag.is_empty() || tag == "|" { continue; }
        for sub in tag.split(',') {
            let sub = sub.trim().to_lowercase();
            if !sub.is_empty() && sub != "|" {
                out.insert(sub);
            }
        }
    }
    out.into_iter().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Unsorted,
    TitleAsc,
    TitleDesc,
    CreatedAsc,
    CreatedDesc,
    ScrapedAsc,
    ScrapedDesc,
}

impl SortOrder {
    /// Parses `title`, `created`, `scraped`, optionally prefixed with `-` for descending.
    /// Anything else leaves results unsorted.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "title" => SortOrder::TitleAsc,
            "-title" => SortOrder::TitleDesc,
            "created" => SortOrder::CreatedAsc,
            "-created" => SortOrder::CreatedDesc,
            "scraped" => SortOrder::ScrapedAsc,
            "-scraped" => SortOrder::ScrapedDesc,
            _ => SortOrder::Unsorted,
        }
    }

    pub fn apply(self, bookmarks: &mut [Bookmark]) {
        match self {
            SortOrder::Unsorted => {}
            SortOrder::TitleAsc => bookmarks.sort_by_cached_key(|b| b.display_title().to_lowercase()),
            SortOrder::TitleDesc => {
                bookmarks.sort_by_cached_key(|b| b.display_title().to_lowercase());
                bookmarks.reverse();
            }
            SortOrder::CreatedAsc => bookmarks.sort_by_key(|b| b.created),
            SortOrder::CreatedDesc => bookmarks.sort_by(|a, b| b.created.cmp(&a.created)),
            SortOrder::ScrapedAsc => bookmarks.sort_by_key(|b| b.last_scraped),
            SortOrder::ScrapedDesc => bookmarks.sort_by(|a, b| b.last_scraped.cmp(&a.last_scraped)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkInfo {
    pub bookmarks: u64,
    pub indexed_words: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub searches: u64,
    /// Samples keyed by unix timestamp.
    pub history: BTreeMap<i64, BookmarkInfo>,
    /// Database size on disk. `Store::stats` overwrites it on every read; the stored copy is ignored.
    pub file_size: u64,
}

impl Stats {
    pub fn most_recent(&self) -> BookmarkInfo {
        self.history.values().next_back().copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn display_title_falls_back_to_url() {
        let mut bm = Bookmark::new("http://example.org", vec![]);
        assert_eq!(bm.display_title(), "http://example.org");
        bm.info.title = "Example Site".into();
        assert_eq!(bm.display_title(), "Example Site");
    }

    #[test]
    fn cleanup_tags_normalizes() {
        let tags = cleanup_tags(&["Rust, web", "|", "", " rust ", "Big Friends"]);
        assert_eq!(tags, vec!["big friends", "rust", "web"]);
    }

    #[test]
    fn sort_orders() {
        let mut a = Bookmark::new("http://a.example", vec![]);
        a.info.title = "beta".into();
        a.created = datetime!(2024-01-02 0:00 UTC);
        let mut b = Bookmark::new("http://b.example", vec![]);
        b.info.title = "Alpha".into();
        b.created = datetime!(2024-01-01 0:00 UTC);
        let mut list = vec![a.clone(), b.clone()];

        SortOrder::parse("title").apply(&mut list);
        assert_eq!(list[0].url, b.url);
        SortOrder::parse("-title").apply(&mut list);
        assert_eq!(list[0].url, a.url);
        SortOrder::parse("created").apply(&mut list);
        assert_eq!(list[0].url, b.url);
        SortOrder::parse("-created").apply(&mut list);
        assert_eq!(list[0].url, a.url);
        assert_eq!(SortOrder::parse("bogus"), SortOrder::Unsorted);
    }

    #[test]
    fn bookmark_serializes_timestamps_as_rfc3339() {
        let bm = Bookmark::new("https://one.com", vec!["hello".into()]);
        let json = serde_json::to_value(&bm).unwrap();
        assert_eq!(json["created"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn most_recent_sample() {
        let mut stats = Stats::default();
        assert_eq!(stats.most_recent(), BookmarkInfo::default());
        stats.history.insert(10, BookmarkInfo { bookmarks: 1, indexed_words: 5 });
        stats.history.insert(20, BookmarkInfo { bookmarks: 2, indexed_words: 9 });
        assert_eq!(stats.most_recent().bookmarks, 2);
    }
}
