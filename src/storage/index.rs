//! In-memory inverted index.
//!
//! Maps every lowercased word to the files containing it and, per file, the
//! sorted positions of the word. A reverse map from file to words keeps
//! re-indexing and removal proportional to the size of the file rather than
//! the size of the index.

use crate::indexing::tokenizer::Token;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Position of a word in a file. Ordered by line, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WordLocation {
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
}

impl WordLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Every location of one word in one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub file: PathBuf,
    pub locations: Vec<WordLocation>,
}

/// Full word map of a single file: lowercased word to sorted locations
pub type WordMap = HashMap<String, Vec<WordLocation>>;

/// Build the word map of a file from its tokens.
pub fn word_map<I>(tokens: I) -> WordMap
where
    I: IntoIterator<Item = Token>,
{
    let mut words = WordMap::new();
    for token in tokens {
        words
            .entry(token.word.to_lowercase())
            .or_default()
            .push(WordLocation::new(token.line, token.column));
    }
    for locations in words.values_mut() {
        locations.sort_unstable();
        locations.dedup();
    }
    words
}

/// Concurrent inverted index.
///
/// Updates to distinct words proceed in parallel; updates to the same word
/// are serialized by the word's shard lock. Updates to the same file are
/// serialized by the file's entry in the reverse map, which is always locked
/// before any word entry.
#[derive(Debug, Default)]
pub struct IndexStore {
    words: DashMap<String, HashMap<PathBuf, Vec<WordLocation>>>,
    files: DashMap<PathBuf, HashSet<String>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything indexed for `path` with `words`.
    ///
    /// Words the file no longer contains lose their entry for this file, and
    /// a word left without files is dropped. Keys are lowercased, so callers
    /// may pass a map built from raw tokens.
    pub fn upsert_file(&self, path: &Path, words: WordMap) {
        let words = normalize(words);
        let mut indexed = self.files.entry(path.to_path_buf()).or_default();

        for stale in indexed.iter().filter(|word| !words.contains_key(*word)) {
            self.detach(stale, path);
        }

        let mut current = HashSet::with_capacity(words.len());
        for (word, locations) in words {
            current.insert(word.clone());
            self.words
                .entry(word)
                .or_default()
                .insert(path.to_path_buf(), locations);
        }

        let empty = current.is_empty();
        *indexed = current;
        drop(indexed);

        if empty {
            self.files.remove_if(path, |_, words| words.is_empty());
        }
    }

    /// Remove a single file from every word. Returns whether it was indexed.
    pub fn remove_file(&self, path: &Path) -> bool {
        match self.files.entry(path.to_path_buf()) {
            Entry::Occupied(indexed) => {
                for word in indexed.get() {
                    self.detach(word, path);
                }
                indexed.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Remove every file located at or below `prefix`.
    ///
    /// The comparison is per path component, so removing `notes/file-1.txt`
    /// leaves `notes/file-1.txt-1.txt` alone. Returns the number of files
    /// removed.
    pub fn remove_by_prefix(&self, prefix: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        doomed.iter().filter(|path| self.remove_file(path)).count()
    }

    /// Files containing `word` (case-insensitive), most occurrences first.
    ///
    /// Files with the same number of occurrences are ordered by path.
    pub fn query(&self, word: &str) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = match self.words.get(&word.to_lowercase()) {
            Some(files) => files
                .iter()
                .map(|(file, locations)| SearchResult {
                    file: file.clone(),
                    locations: locations.clone(),
                })
                .collect(),
            None => return Vec::new(),
        };

        results.sort_by(|a, b| {
            b.locations
                .len()
                .cmp(&a.locations.len())
                .then_with(|| a.file.cmp(&b.file))
        });
        results
    }

    /// Whether any word is indexed for `path`
    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of distinct indexed words
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of indexed files
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.files.clear();
        self.words.clear();
    }

    fn detach(&self, word: &str, path: &Path) {
        if let Entry::Occupied(mut bucket) = self.words.entry(word.to_owned()) {
            bucket.get_mut().remove(path);
            if bucket.get().is_empty() {
                bucket.remove();
            }
        }
    }
}

fn normalize(words: WordMap) -> WordMap {
    if words.keys().all(|word| !word.chars().any(char::is_uppercase)) {
        let mut words = words;
        words.retain(|_, locations| !locations.is_empty());
        return words;
    }

    let mut merged = WordMap::with_capacity(words.len());
    for (word, mut locations) in words {
        merged
            .entry(word.to_lowercase())
            .or_default()
            .append(&mut locations);
    }
    merged.retain(|_, locations| !locations.is_empty());
    for locations in merged.values_mut() {
        locations.sort_unstable();
        locations.dedup();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[(&str, usize, usize)]) -> Vec<Token> {
        words
            .iter()
            .map(|(word, line, column)| Token::new(*word, *line, *column))
            .collect()
    }

    #[test]
    fn test_word_map_groups_and_sorts() {
        let map = word_map(tokens(&[("World", 2, 1), ("world", 1, 7), ("Hello", 1, 1)]));
        assert_eq!(map.len(), 2);
        assert_eq!(
            map["world"],
            vec![WordLocation::new(1, 7), WordLocation::new(2, 1)]
        );
        assert_eq!(map["hello"], vec![WordLocation::new(1, 1)]);
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file.txt");
        store.upsert_file(&file, word_map(tokens(&[("Hello", 1, 1), ("World", 1, 7)])));

        let results = store.query("wORlD");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file, file);
        assert_eq!(results[0].locations, vec![WordLocation::new(1, 7)]);
    }

    #[test]
    fn test_query_unknown_word_is_empty() {
        let store = IndexStore::new();
        assert!(store.query("missing").is_empty());
    }

    #[test]
    fn test_query_orders_by_occurrences() {
        let store = IndexStore::new();
        let one = PathBuf::from("/notes/a.txt");
        let two = PathBuf::from("/notes/b.txt");
        store.upsert_file(&one, word_map(tokens(&[("World", 1, 7)])));
        store.upsert_file(&two, word_map(tokens(&[("World", 1, 1), ("World", 1, 7)])));

        let results = store.query("world");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file, two);
        assert_eq!(
            results[0].locations,
            vec![WordLocation::new(1, 1), WordLocation::new(1, 7)]
        );
        assert_eq!(results[1].file, one);
    }

    #[test]
    fn test_query_ties_are_ordered_by_path() {
        let store = IndexStore::new();
        for name in ["/c.txt", "/a.txt", "/b.txt"] {
            store.upsert_file(Path::new(name), word_map(tokens(&[("tie", 1, 1)])));
        }

        let files: Vec<PathBuf> = store.query("tie").into_iter().map(|r| r.file).collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/a.txt"),
                PathBuf::from("/b.txt"),
                PathBuf::from("/c.txt")
            ]
        );
    }

    #[test]
    fn test_upsert_replaces_previous_words() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file.txt");
        store.upsert_file(&file, word_map(tokens(&[("alpha", 1, 1), ("beta", 1, 7)])));
        store.upsert_file(&file, word_map(tokens(&[("beta", 2, 1), ("gamma", 2, 6)])));

        assert!(store.query("alpha").is_empty());
        assert_eq!(store.query("beta")[0].locations, vec![WordLocation::new(2, 1)]);
        assert_eq!(store.query("gamma").len(), 1);
        assert_eq!(store.word_count(), 2);
    }

    #[test]
    fn test_upsert_with_empty_map_forgets_file() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file.txt");
        store.upsert_file(&file, word_map(tokens(&[("alpha", 1, 1)])));
        store.upsert_file(&file, WordMap::new());

        assert!(!store.contains_file(&file));
        assert_eq!(store.word_count(), 0);
    }

    #[test]
    fn test_upsert_lowercases_raw_keys() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file.txt");
        let mut raw = WordMap::new();
        raw.insert("Hello".to_string(), vec![WordLocation::new(2, 1)]);
        raw.insert("hello".to_string(), vec![WordLocation::new(1, 1)]);
        store.upsert_file(&file, raw);

        assert_eq!(
            store.query("HELLO")[0].locations,
            vec![WordLocation::new(1, 1), WordLocation::new(2, 1)]
        );
    }

    #[test]
    fn test_remove_file_keeps_other_files() {
        let store = IndexStore::new();
        let one = PathBuf::from("/notes/a.txt");
        let two = PathBuf::from("/notes/b.txt");
        store.upsert_file(&one, word_map(tokens(&[("shared", 1, 1), ("only", 1, 8)])));
        store.upsert_file(&two, word_map(tokens(&[("shared", 1, 1)])));

        assert!(store.remove_file(&one));
        assert!(!store.remove_file(&one));
        assert!(store.query("only").is_empty());
        assert_eq!(store.query("shared").len(), 1);
        assert_eq!(store.file_count(), 1);
    }

    #[test]
    fn test_remove_by_prefix_respects_component_boundaries() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file-1.txt");
        let lookalike = PathBuf::from("/notes/file-1.txt-1.txt");
        let nested = PathBuf::from("/notes/dir/inner.txt");
        for path in [&file, &lookalike, &nested] {
            store.upsert_file(path, word_map(tokens(&[("hello", 1, 1)])));
        }

        assert_eq!(store.remove_by_prefix(&file), 1);
        assert_eq!(store.query("hello").len(), 2);

        assert_eq!(store.remove_by_prefix(Path::new("/notes/dir")), 1);
        let remaining: Vec<PathBuf> = store.query("hello").into_iter().map(|r| r.file).collect();
        assert_eq!(remaining, vec![lookalike]);
    }

    #[test]
    fn test_remove_on_empty_store_is_noop() {
        let store = IndexStore::new();
        assert!(!store.remove_file(Path::new("/missing.txt")));
        assert_eq!(store.remove_by_prefix(Path::new("/")), 0);
    }

    #[test]
    fn test_reindexing_unchanged_content_is_idempotent() {
        let store = IndexStore::new();
        let file = PathBuf::from("/notes/file.txt");
        let content = tokens(&[("alpha", 1, 1), ("beta", 1, 7), ("alpha", 2, 1)]);

        store.upsert_file(&file, word_map(content.clone()));
        let before = (store.query("alpha"), store.query("beta"), store.word_count());
        store.upsert_file(&file, word_map(content));
        let after = (store.query("alpha"), store.query("beta"), store.word_count());

        assert_eq!(before, after);
    }

    #[test]
    fn test_concurrent_upserts() {
        let store = std::sync::Arc::new(IndexStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let file = PathBuf::from(format!("/notes/file-{}.txt", i));
                    store.upsert_file(
                        &file,
                        word_map(tokens(&[("test", 1, 1), ("test", 1, 6), ("test", 1, 11)])),
                    );
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let results = store.query("test");
        assert_eq!(results.len(), 16);
        assert_eq!(results.iter().map(|r| r.locations.len()).sum::<usize>(), 48);
    }

    #[test]
    fn test_clear() {
        let store = IndexStore::new();
        store.upsert_file(Path::new("/a.txt"), word_map(tokens(&[("alpha", 1, 1)])));
        store.clear();
        assert_eq!(store.word_count(), 0);
        assert_eq!(store.file_count(), 0);
    }
}
