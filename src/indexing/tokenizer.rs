use crate::core::error::{Error, Result};
use crate::indexing::discovery::is_plain_text_file;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// Words dropped by the default tokenizer
pub const DEFAULT_STOP_WORDS: &[&str] = &["is", "the", "am"];

/// Shortest word (in characters) the default tokenizer emits
pub const DEFAULT_MIN_WORD_LEN: usize = 2;

/// A word occurrence in a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    pub word: String,
    /// 1-based line number
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
}

impl Token {
    pub fn new(word: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            word: word.into(),
            line,
            column,
        }
    }
}

/// Splits a file into words.
///
/// Implementations must be cheap to share between threads: the indexer calls
/// them from the blocking worker pool, many files at a time.
pub trait Tokenizer: Send + Sync {
    /// Whether this tokenizer accepts the file at `path`.
    ///
    /// Used both to validate root paths and to filter tree walks.
    fn supports(&self, path: &Path) -> bool {
        is_plain_text_file(path)
    }

    /// Returns the words of the file in reading order.
    ///
    /// Fails with [`Error::InvalidArgument`] when the path is missing, is not
    /// a regular file, or is not supported.
    fn tokenize(&self, path: &Path) -> Result<Vec<Token>>;
}

/// Default tokenizer: words are runs of alphanumeric characters and `_`
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    min_word_len: usize,
    stop_words: HashSet<String>,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self {
            min_word_len: DEFAULT_MIN_WORD_LEN,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stop-word set. Matching is exact, case included.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .collect();
        self
    }

    /// Set the shortest word length (in characters) to keep
    pub fn with_min_word_len(mut self, len: usize) -> Self {
        self.min_word_len = len.max(1);
        self
    }

    /// Tokenize in-memory text
    pub fn tokenize_str(&self, content: &str) -> Vec<Token> {
        let mut tokens = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_number = index + 1;
            let mut word = String::new();
            let mut start = 0;

            for (offset, ch) in line.chars().enumerate() {
                if is_word_char(ch) {
                    if word.is_empty() {
                        start = offset + 1;
                    }
                    word.push(ch);
                } else if !word.is_empty() {
                    self.push_word(&mut tokens, &mut word, line_number, start);
                }
            }

            if !word.is_empty() {
                self.push_word(&mut tokens, &mut word, line_number, start);
            }
        }

        tokens
    }

    fn push_word(&self, tokens: &mut Vec<Token>, word: &mut String, line: usize, column: usize) {
        let taken = std::mem::take(word);
        if taken.chars().count() < self.min_word_len {
            return;
        }
        if self.stop_words.contains(&taken) {
            return;
        }
        tokens.push(Token::new(taken, line, column));
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, path: &Path) -> Result<Vec<Token>> {
        if !path.exists() {
            return Err(Error::InvalidArgument(format!(
                "Provided file does not exist: '{}'",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(Error::InvalidArgument(format!(
                "Provided path is not a regular file: '{}'",
                path.display()
            )));
        }

        if !self.supports(path) {
            return Err(Error::InvalidArgument(format!(
                "Unsupported content type: '{}'",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)?;
        Ok(self.tokenize_str(&String::from_utf8_lossy(&bytes)))
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_tokenize_reports_one_based_positions() {
        let tokens = WordTokenizer::new().tokenize_str("Hello\n  World");
        assert_eq!(
            tokens,
            vec![Token::new("Hello", 1, 1), Token::new("World", 2, 3)]
        );
    }

    #[test]
    fn test_tokenize_skips_short_and_stop_words() {
        let tokens = WordTokenizer::new().tokenize_str("a is the am be");
        assert_eq!(tokens, vec![Token::new("be", 1, 13)]);
    }

    #[test]
    fn test_stop_words_match_case() {
        let tokens = WordTokenizer::new().tokenize_str("The cat is Is");
        assert_eq!(
            tokens,
            vec![
                Token::new("The", 1, 1),
                Token::new("cat", 1, 5),
                Token::new("Is", 1, 12),
            ]
        );
    }

    #[test]
    fn test_tokenize_splits_on_punctuation() {
        let tokens = WordTokenizer::new().tokenize_str("foo,bar-baz snake_case");
        let words: Vec<&str> = tokens.iter().map(|t| t.word.as_str()).collect();
        assert_eq!(words, vec!["foo", "bar", "baz", "snake_case"]);
        assert_eq!(tokens[1].column, 5);
        assert_eq!(tokens[3].column, 13);
    }

    #[test]
    fn test_columns_count_characters_not_bytes() {
        let tokens = WordTokenizer::new().tokenize_str("héllo wörld");
        assert_eq!(tokens[1], Token::new("wörld", 1, 7));
    }

    #[test]
    fn test_crlf_line_endings() {
        let tokens = WordTokenizer::new().tokenize_str("one\r\ntwo\r\n");
        assert_eq!(tokens, vec![Token::new("one", 1, 1), Token::new("two", 2, 1)]);
    }

    #[test]
    fn test_custom_stop_words_and_length() {
        let tokenizer = WordTokenizer::new()
            .with_stop_words(["hello"])
            .with_min_word_len(1);
        let tokens = tokenizer.tokenize_str("hello a the Hello");
        let words: Vec<&str> = tokens.iter().map(|t| t.word.as_str()).collect();
        assert_eq!(words, vec!["a", "the", "Hello"]);
    }

    #[test]
    fn test_tokenize_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("text-file.txt");
        fs::write(&file, "Hello\n  World").unwrap();

        let tokens = WordTokenizer::new().tokenize(&file).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1], Token::new("World", 2, 3));
    }

    #[test]
    fn test_tokenize_rejects_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = WordTokenizer::new().tokenize(&temp_dir.path().join("file.txt"));
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_tokenize_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("folder");
        fs::create_dir(&folder).unwrap();

        let result = WordTokenizer::new().tokenize(&folder);
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_tokenize_rejects_unsupported_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("music-file.mp3");
        fs::write(&file, "").unwrap();

        let result = WordTokenizer::new().tokenize(&file);
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_stop_words_only_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("text-file.txt");
        fs::write(&file, "is the am").unwrap();

        assert!(WordTokenizer::new().tokenize(&file).unwrap().is_empty());
    }
}
