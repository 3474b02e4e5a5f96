//! sled-backed storage for bookmarks, postings and stats.
//!
//! Trees:
//! - `bookmarks`: big-endian id -> bincode [`Bookmark`]
//! - `bookmark_urls`: url -> big-endian id, the uniqueness index used on add
//! - `postings`: term -> bincode `BTreeSet<DocId>`
//! - `meta`: `stats` -> bincode [`Stats`]

use crate::entity::{Bookmark, Stats};
use crate::error::{Error, Result};
use crate::DocId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeSet;
use std::path::Path;

pub type TxResult<T> = ConflictableTransactionResult<T, Error>;

const STATS_KEY: &[u8] = b"stats";

/// Abort the enclosing transaction with `err`. Nothing written inside it becomes visible.
pub fn abort<E: Into<Error>>(err: E) -> ConflictableTransactionError<Error> {
    ConflictableTransactionError::Abort(err.into())
}

fn encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> { bincode::serialize(value).map_err(abort) }

fn decode<T: DeserializeOwned>(raw: &[u8]) -> TxResult<T> { bincode::deserialize(raw).map_err(abort) }

/// Posting operations available inside one write transaction.
pub struct PostingTxn<'a> {
    tree: &'a TransactionalTree,
}

impl PostingTxn<'_> {
    pub fn get(&self, term: &str) -> TxResult<Option<BTreeSet<DocId>>> {
        match self.tree.get(term.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Full replace. An empty set removes the term.
    pub fn put(&self, term: &str, ids: &BTreeSet<DocId>) -> TxResult<()> {
        if ids.is_empty() {
            self.tree.remove(term.as_bytes())?;
        } else {
            self.tree.insert(term.as_bytes(), encode(ids)?)?;
        }
        Ok(())
    }
}

pub struct Store {
    db: Db,
    bookmarks: Tree,
    urls: Tree,
    postings: Tree,
    meta: Tree,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            bookmarks: db.open_tree("bookmarks")?,
            urls: db.open_tree("bookmark_urls")?,
            postings: db.open_tree("postings")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    /// Fresh bookmark id. Never 0 and never reused.
    pub fn next_id(&self) -> Result<DocId> { Ok(self.db.generate_id()? + 1) }

    pub fn bookmark(&self, id: DocId) -> Result<Option<Bookmark>> {
        match self.bookmarks.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn bookmarks(&self) -> impl Iterator<Item = Result<Bookmark>> {
        self.bookmarks.iter().values().map(|raw| -> Result<Bookmark> { Ok(bincode::deserialize(&raw?)?) })
    }

    pub fn bookmark_count(&self) -> usize { self.bookmarks.len() }

    /// Inserts a new bookmark, failing with [`Error::Duplicate`] when the URL is already stored.
    pub fn insert_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let key = bookmark.id.to_be_bytes();
        let raw = bincode::serialize(bookmark)?;
        (&self.bookmarks, &self.urls).transaction(|(bookmarks, urls)| -> TxResult<()> {
            if urls.get(bookmark.url.as_bytes())?.is_some() {
                return Err(abort(Error::Duplicate(bookmark.url.clone())));
            }
            urls.insert(bookmark.url.as_bytes(), &key[..])?;
            bookmarks.insert(&key[..], raw.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }

    /// Read-modify-write of one bookmark in a single transaction. `None` if it does not exist.
    pub fn update_bookmark<F>(&self, id: DocId, edit: F) -> Result<Option<Bookmark>>
    where
        F: Fn(&mut Bookmark),
    {
        let key = id.to_be_bytes();
        let updated = self.bookmarks.transaction(|tx| -> TxResult<Option<Bookmark>> {
            let Some(raw) = tx.get(&key[..])? else { return Ok(None) };
            let mut bookmark: Bookmark = decode(&raw)?;
            edit(&mut bookmark);
            tx.insert(&key[..], encode(&bookmark)?)?;
            Ok(Some(bookmark))
        })?;
        Ok(updated)
    }

    pub fn remove_bookmark(&self, id: DocId) -> Result<Option<Bookmark>> {
        let key = id.to_be_bytes();
        let removed = (&self.bookmarks, &self.urls).transaction(|(bookmarks, urls)| -> TxResult<Option<Bookmark>> {
            let Some(raw) = bookmarks.remove(&key[..])? else { return Ok(None) };
            let bookmark: Bookmark = decode(&raw)?;
            urls.remove(bookmark.url.as_bytes())?;
            Ok(Some(bookmark))
        })?;
        Ok(removed)
    }

    pub fn posting(&self, term: &str) -> Result<Option<BTreeSet<DocId>>> {
        match self.postings.get(term.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Point-in-time iteration over every posting, outside any transaction.
    pub fn postings(&self) -> impl Iterator<Item = Result<(String, BTreeSet<DocId>)>> {
        self.postings.iter().map(|entry| -> Result<(String, BTreeSet<DocId>)> {
            let (term, raw) = entry?;
            Ok((String::from_utf8_lossy(&term).into_owned(), bincode::deserialize(&raw)?))
        })
    }

    pub fn posting_count(&self) -> usize { self.postings.len() }

    /// Runs `f` as one all-or-nothing write transaction over the postings tree.
    pub fn posting_transaction<A, F>(&self, f: F) -> Result<A>
    where
        F: Fn(&PostingTxn<'_>) -> TxResult<A>,
    {
        let out = self.postings.transaction(|tree| f(&PostingTxn { tree }))?;
        Ok(out)
    }

    pub fn stats(&self) -> Result<Stats> {
        let mut stats: Stats = match self.meta.get(STATS_KEY)? {
            Some(raw) => bincode::deserialize(&raw)?,
            None => Stats::default(),
        };
        stats.file_size = self.db.size_on_disk()?;
        Ok(stats)
    }

    pub fn update_stats<F>(&self, edit: F) -> Result<Stats>
    where
        F: Fn(&mut Stats),
    {
        let stats = self.meta.transaction(|tx| -> TxResult<Stats> {
            let mut stats: Stats = match tx.get(STATS_KEY)? {
                Some(raw) => decode(&raw)?,
                None => Stats::default(),
            };
            edit(&mut stats);
            tx.insert(STATS_KEY, encode(&stats)?)?;
            Ok(stats)
        })?;
        Ok(stats)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
