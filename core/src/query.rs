//! Conjunctive term search over the postings.
//!
//! Results carry no relevance rank. Qualifying documents come back in ascending id order,
//! which is an artifact of the posting representation and not a ranking.

use crate::entity::Bookmark;
use crate::error::Result;
use crate::index::tag_term;
use crate::persist::Store;
use crate::tokenizer::tokenize;
use crate::DocId;
use std::collections::{BTreeMap, BTreeSet};

/// Documents containing `term`. An absent posting is an empty set.
pub fn by_term(store: &Store, term: &str) -> Result<BTreeSet<DocId>> {
    Ok(store.posting(term)?.unwrap_or_default())
}

/// Loads the bookmarks for `ids` in iteration order, skipping ids that no longer exist.
pub fn by_id_set<'a, I>(store: &Store, ids: I) -> Result<Vec<Bookmark>>
where
    I: IntoIterator<Item = &'a DocId>,
{
    let mut out = Vec::new();
    for id in ids {
        if let Some(bookmark) = store.bookmark(*id)? {
            out.push(bookmark);
        }
    }
    Ok(out)
}

/// Required keyword terms for a set of tags: a document must carry every one.
pub fn with_tags_all<S: AsRef<str>>(tags: &[S]) -> BTreeSet<String> {
    tags.iter().map(|t| t.as_ref()).filter(|t| !t.trim().is_empty()).map(tag_term).collect()
}

/// Ids of the documents present in the posting of every term in `terms`, at most `limit`.
pub fn matching_ids(store: &Store, terms: &BTreeSet<String>, limit: usize) -> Result<Vec<DocId>> {
    if terms.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut counts: BTreeMap<DocId, usize> = BTreeMap::new();
    for term in terms {
        let ids = by_term(store, term)?;
        // One missing term means nothing can match all of them.
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        for id in ids {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    let required = terms.len();
    Ok(counts.into_iter().filter(|(_, n)| *n == required).map(|(id, _)| id).take(limit).collect())
}

/// Tokenizes `query`, adds the tag constraints and returns at most `limit` bookmarks that
/// satisfy all of them. Repeated query words count once.
pub fn search<S: AsRef<str>>(store: &Store, query: &str, tags: &[S], limit: usize) -> Result<Vec<Bookmark>> {
    let mut terms: BTreeSet<String> = tokenize(query).into_iter().collect();
    terms.extend(with_tags_all(tags));
    let ids = matching_ids(store, &terms, limit)?;
    by_id_set(store, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{document_terms, IndexManager};
    use std::sync::Arc;

    fn indexed(docs: &[(&str, &str, &[&str])]) -> Arc<Store> {
        let store = Arc::new(Store::temporary().unwrap());
        let index = IndexManager::new(store.clone(), 100);
        for (url, text, tags) in docs {
            let mut bm = Bookmark::new(*url, tags.iter().map(|t| t.to_string()).collect());
            bm.id = store.next_id().unwrap();
            bm.info.raw_text = text.to_string();
            store.insert_bookmark(&bm).unwrap();
            index.reindex_document(bm.id, &document_terms(&bm)).unwrap();
        }
        store
    }

    fn urls(results: Vec<Bookmark>) -> Vec<String> { results.into_iter().map(|b| b.url).collect() }

    const NO_TAGS: &[&str] = &[];

    #[test]
    fn conjunction_of_terms() {
        let store = indexed(&[
            ("http://a.test", "red apples and green pears", &[]),
            ("http://b.test", "red cars", &[]),
            ("http://c.test", "green apples", &[]),
        ]);
        assert_eq!(urls(search(&store, "apples", NO_TAGS, 10).unwrap()), vec!["http://a.test", "http://c.test"]);
        assert_eq!(urls(search(&store, "red apple", NO_TAGS, 10).unwrap()), vec!["http://a.test"]);
        assert!(search(&store, "red zebra", NO_TAGS, 10).unwrap().is_empty());
    }

    #[test]
    fn empty_query_is_empty_result() {
        let store = indexed(&[("http://a.test", "something", &[])]);
        assert!(search(&store, "", NO_TAGS, 10).unwrap().is_empty());
        assert!(search(&store, "the and of", NO_TAGS, 10).unwrap().is_empty());
    }

    #[test]
    fn repeated_words_count_once() {
        let store = indexed(&[("http://a.test", "fox", &[])]);
        assert_eq!(search(&store, "fox fox FOX", NO_TAGS, 10).unwrap().len(), 1);
    }

    #[test]
    fn result_cap_applies() {
        let docs: Vec<(String, &str, &[&str])> = (0..15).map(|i| (format!("http://{i}.test"), "shared words", &[][..])).collect();
        let refs: Vec<(&str, &str, &[&str])> = docs.iter().map(|(u, t, g)| (u.as_str(), *t, *g)).collect();
        let store = indexed(&refs);
        assert_eq!(search(&store, "shared", NO_TAGS, 10).unwrap().len(), 10);
        let terms: BTreeSet<String> = tokenize("shared").into_iter().collect();
        assert_eq!(matching_ids(&store, &terms, 100).unwrap().len(), 15);
    }

    #[test]
    fn tags_are_a_hard_filter() {
        let store = indexed(&[
            ("http://a.test", "rust tips", &["lang", "howto"]),
            ("http://b.test", "rust news", &["lang"]),
        ]);
        assert_eq!(search(&store, "rust", &["lang"], 10).unwrap().len(), 2);
        assert_eq!(urls(search(&store, "rust", &["lang", "howto"], 10).unwrap()), vec!["http://a.test"]);
        assert!(search(&store, "rust", &["missing"], 10).unwrap().is_empty());
        assert_eq!(urls(search(&store, "", &["howto"], 10).unwrap()), vec!["http://a.test"]);
    }

    #[test]
    fn tag_words_are_searchable() {
        let store = indexed(&[("http://a.test", "the quick brown fox", &["sloth"])]);
        assert_eq!(search(&store, "sloth", NO_TAGS, 10).unwrap().len(), 1);
    }
}
