use crate::config::Settings;
use crate::entity::{cleanup_tags, Bookmark, BookmarkEdit, BookmarkInfo, PageInfo, SortOrder, Stats};
use crate::error::{Error, Result};
use crate::index::{document_terms, IndexManager};
use crate::persist::Store;
use crate::{query, DocId};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub query: String,
    /// Every tag must be present on a result.
    pub tags: Vec<String>,
    pub sort: SortOrder,
    /// Overrides the configured result cap.
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct BulkAdd {
    pub added: usize,
    pub errors: Vec<String>,
}

/// Entry point for every bookmark operation.
///
/// All writes that touch postings go through `writer`, so there is at most one index writer
/// at a time. Reads take no lock.
pub struct Library {
    store: Arc<Store>,
    index: IndexManager,
    writer: Mutex<()>,
    settings: Settings,
}

impl Library {
    pub fn open<P: AsRef<Path>>(path: P, settings: Settings) -> Result<Self> {
        Ok(Self::new(Arc::new(Store::open(path)?), settings))
    }

    pub fn temporary(settings: Settings) -> Result<Self> {
        Ok(Self::new(Arc::new(Store::temporary()?), settings))
    }

    pub fn new(store: Arc<Store>, settings: Settings) -> Self {
        let index = IndexManager::new(store.clone(), settings.index.batch_size);
        Self { store, index, writer: Mutex::new(()), settings }
    }

    pub fn store(&self) -> &Store { &self.store }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Stores a new, not yet scraped bookmark. Fails on a non-http(s) URL or a URL that is
    /// already stored.
    pub fn add_bookmark<S: AsRef<str>>(&self, url: &str, tags: &[S]) -> Result<Bookmark> {
        let url = url.trim();
        validate_url(url)?;
        let mut bookmark = Bookmark::new(url, tags.iter().map(|t| t.as_ref().to_owned()).collect());
        bookmark.id = self.store.next_id()?;
        bookmark.created = OffsetDateTime::now_utc();
        self.store.insert_bookmark(&bookmark)?;
        tracing::info!(id = bookmark.id, url, "added bookmark");
        Ok(bookmark)
    }

    /// Adds one bookmark per non-blank line, collecting failures instead of stopping.
    pub fn add_bookmarks<I, S>(&self, urls: I) -> BulkAdd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = BulkAdd::default();
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() { continue; }
            match self.add_bookmark::<&str>(url, &[]) {
                Ok(_) => out.added += 1,
                Err(err) => out.errors.push(format!("url: {url} ({err})")),
            }
        }
        out
    }

    pub fn load_bookmark(&self, id: DocId) -> Result<Option<Bookmark>> { self.store.bookmark(id) }

    pub fn bookmark(&self, id: DocId) -> Result<Bookmark> {
        self.store.bookmark(id)?.ok_or(Error::NotFound(id))
    }

    /// Applies a title override and new tags, then reindexes since both feed the term set.
    pub fn edit_bookmark(&self, id: DocId, edit: &BookmarkEdit) -> Result<Bookmark> {
        let tags = cleanup_tags(&edit.tags);
        let _writer = self.writer.lock();
        let bookmark = self
            .store
            .update_bookmark(id, |bm| {
                match &edit.title {
                    Some(title) => {
                        bm.info.title = title.clone();
                        bm.preserve_title = true;
                    }
                    None => bm.preserve_title = false,
                }
                bm.tags = tags.clone();
            })?
            .ok_or(Error::NotFound(id))?;
        self.index.reindex_document(id, &document_terms(&bookmark))?;
        Ok(bookmark)
    }

    /// Removes the bookmark and its id from every posting.
    pub fn delete_bookmark(&self, id: DocId) -> Result<Bookmark> {
        let _writer = self.writer.lock();
        if self.store.bookmark(id)?.is_none() {
            return Err(Error::NotFound(id));
        }
        // Postings go first: a crash in between leaves an unindexed bookmark, not orphan postings.
        self.index.remove_document(id)?;
        let removed = self.store.remove_bookmark(id)?.ok_or(Error::NotFound(id))?;
        tracing::info!(id, url = %removed.url, "deleted bookmark");
        Ok(removed)
    }

    /// Every bookmark, read straight from storage without the index.
    pub fn list_bookmarks(&self, sort: SortOrder) -> Result<Vec<Bookmark>> {
        let mut all = self.store.bookmarks().collect::<Result<Vec<_>>>()?;
        sort.apply(&mut all);
        Ok(all)
    }

    /// Bookmarks matching every query term and every tag, capped at the result limit. The
    /// cap is applied before sorting, so `sort` only orders the returned page.
    pub fn search(&self, opts: &SearchOptions) -> Result<Vec<Bookmark>> {
        let limit = opts.limit.unwrap_or(self.settings.search.limit);
        let mut found = query::search(&self.store, &opts.query, &opts.tags, limit)?;
        opts.sort.apply(&mut found);
        if let Err(err) = self.store.update_stats(|s| s.searches += 1) {
            tracing::warn!(%err, "could not count search");
        }
        Ok(found)
    }

    pub fn export_bookmarks<W: Write>(&self, mut w: W) -> Result<()> {
        for bookmark in self.store.bookmarks() {
            writeln!(w, "{}", bookmark?.url)?;
        }
        Ok(())
    }

    /// Marks the bookmark as scraped now, before the scrape runs, so the staleness scan
    /// will not pick it up again while it waits in the queue.
    pub fn stamp_scraped(&self, id: DocId) -> Result<Bookmark> {
        let now = OffsetDateTime::now_utc();
        self.store.update_bookmark(id, |bm| bm.last_scraped = now)?.ok_or(Error::NotFound(id))
    }

    /// Stores freshly fetched page info and reindexes the bookmark. Returns `None` when the
    /// bookmark was deleted in the meantime; it is not recreated.
    pub fn apply_scrape(&self, id: DocId, info: PageInfo) -> Result<Option<Bookmark>> {
        let now = OffsetDateTime::now_utc();
        let _writer = self.writer.lock();
        let updated = self.store.update_bookmark(id, |bm| {
            let mut info = info.clone();
            if bm.preserve_title {
                info.title = bm.info.title.clone();
            }
            bm.info = info;
            bm.last_scraped = now;
        })?;
        let Some(bookmark) = updated else { return Ok(None) };
        self.index.reindex_document(id, &document_terms(&bookmark))?;
        Ok(Some(bookmark))
    }

    /// Bookmarks last scraped strictly before `cutoff`. Never scraped bookmarks always qualify.
    pub fn stale_bookmarks(&self, cutoff: OffsetDateTime) -> Result<Vec<Bookmark>> {
        let mut out = Vec::new();
        for bookmark in self.store.bookmarks() {
            let bookmark = bookmark?;
            if bookmark.last_scraped < cutoff {
                out.push(bookmark);
            }
        }
        Ok(out)
    }

    /// Rebuilds the postings of every bookmark from its stored page info.
    pub fn reindex_all(&self) -> Result<usize> {
        let ids: Vec<DocId> = self.store.bookmarks().map(|b| b.map(|b| b.id)).collect::<Result<_>>()?;
        let mut done = 0;
        for id in ids {
            let _writer = self.writer.lock();
            // Deleted since the id snapshot.
            let Some(bookmark) = self.store.bookmark(id)? else { continue };
            self.index.reindex_document(id, &document_terms(&bookmark))?;
            done += 1;
        }
        tracing::info!(bookmarks = done, terms = self.store.posting_count(), "rebuilt index");
        Ok(done)
    }

    pub fn dump_index(&self) -> Result<Vec<(String, BTreeSet<DocId>)>> { self.store.postings().collect() }

    pub fn stats(&self) -> Result<Stats> { self.store.stats() }

    /// Appends a sample of the bookmark and indexed word counts to the stats history.
    pub fn update_bookmark_stats(&self) -> Result<Stats> {
        let sample = BookmarkInfo {
            bookmarks: self.store.bookmark_count() as u64,
            indexed_words: self.store.posting_count() as u64,
        };
        let at = OffsetDateTime::now_utc().unix_timestamp();
        self.store.update_stats(|s| {
            s.history.insert(at, sample);
        })
    }
}

fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    match url::Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => Ok(()),
        _ => Err(Error::InvalidUrl(url.to_string())),
    }
}
