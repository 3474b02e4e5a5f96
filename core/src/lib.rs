//! Bookmark content indexing: tokenizer, sled-backed inverted index, conjunctive search,
//! and the background scrape queue that keeps stored page content fresh.

pub mod config;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod index;
pub mod library;
pub mod persist;
pub mod query;
pub mod queue;
pub mod scanner;
pub mod tokenizer;

/// Bookmark identifier assigned by storage. Never 0, never reused.
pub type DocId = u64;

pub use config::Settings;
pub use entity::{cleanup_tags, Bookmark, BookmarkEdit, BookmarkInfo, PageInfo, SortOrder, Stats};
pub use error::{Error, FetchError, Result};
pub use fetch::PageFetcher;
pub use library::{BulkAdd, Library, SearchOptions};
pub use queue::{QueueHandle, ScrapeQueue};
pub use scanner::StalenessScanner;
