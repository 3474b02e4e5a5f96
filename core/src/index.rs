use crate::entity::Bookmark;
use crate::error::Result;
use crate::persist::{Store, TxResult};
use crate::tokenizer::tokenize;
use crate::DocId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Prefix of the keyword term recorded for every tag, used by the tag filter.
pub const TAG_PREFIX: &str = "tag:";

pub fn tag_term(tag: &str) -> String { format!("{TAG_PREFIX}{}", tag.trim().to_lowercase()) }

/// Terms a bookmark is indexed under: tokenized body text, title, URL and tags, plus one
/// keyword term per raw tag.
pub fn document_terms(bookmark: &Bookmark) -> BTreeSet<String> {
    let mut terms: BTreeSet<String> = tokenize(&bookmark.info.raw_text).into_iter().collect();
    terms.extend(tokenize(&bookmark.info.title));
    terms.extend(tokenize(&bookmark.url));
    for tag in &bookmark.tags {
        terms.extend(tokenize(tag));
        terms.insert(tag_term(tag));
    }
    terms
}

/// Maintains the term -> document id postings.
///
/// Callers serialize writes for the same document; the library holds a writer lock around
/// every call that mutates postings.
pub struct IndexManager {
    store: Arc<Store>,
    batch_size: usize,
}

impl IndexManager {
    pub fn new(store: Arc<Store>, batch_size: usize) -> Self {
        Self { store, batch_size: batch_size.max(1) }
    }

    /// Replace the postings of `id` with exactly `terms`.
    ///
    /// The removal of every existing posting for `id` commits before any insert batch, so a
    /// crash in between leaves the document under-indexed but never with stale postings.
    pub fn reindex_document(&self, id: DocId, terms: &BTreeSet<String>) -> Result<()> {
        let removed = self.remove_document(id)?;
        let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
        for batch in terms.chunks(self.batch_size) {
            self.store.posting_transaction(|txn| -> TxResult<()> {
                for term in batch {
                    let mut ids = txn.get(term)?.unwrap_or_default();
                    ids.insert(id);
                    txn.put(term, &ids)?;
                }
                Ok(())
            })?;
        }
        tracing::debug!(id, removed, added = terms.len(), "reindexed document");
        Ok(())
    }

    /// Remove `id` from every posting. Returns the number of postings that held it.
    pub fn remove_document(&self, id: DocId) -> Result<usize> {
        // Collect first, then rewrite inside the transaction: the tree is never mutated while
        // it is being iterated.
        let mut holding = Vec::new();
        for entry in self.store.postings() {
            let (term, ids) = entry?;
            if ids.contains(&id) {
                holding.push(term);
            }
        }
        if holding.is_empty() {
            return Ok(0);
        }
        self.store.posting_transaction(|txn| -> TxResult<()> {
            for term in &holding {
                if let Some(mut ids) = txn.get(term)? {
                    if ids.remove(&id) {
                        txn.put(term, &ids)?;
                    }
                }
            }
            Ok(())
        })?;
        Ok(holding.len())
    }
}
