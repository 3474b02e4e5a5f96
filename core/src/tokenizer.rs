use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &["a", "and", "be", "have", "i", "in", "of", "that", "the", "to"];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into search terms: NFKC normalization, lowercase, split on anything
/// that is not a letter or digit, stopword removal, English stemming. Order is preserved
/// and duplicates are kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|mat| mat.as_str())
        .filter(|token| !is_stopword(token))
        .map(|token| STEMMER.stem(token).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn splits_on_punctuation_and_keeps_digits() {
        let t = tokenize("example.com/item-42");
        assert_eq!(t, vec!["exampl", "com", "item", "42"]);
    }

    #[test]
    fn empty_and_stopword_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  -- !! ").is_empty());
        assert!(tokenize("The and OF to").is_empty());
    }
}
