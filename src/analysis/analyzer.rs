//! Analyzer implementations.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::Token;

/// English stop words removed by [`StandardAnalyzer`] by default.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Longest token the standard analyzer keeps, in bytes.
pub const MAX_TOKEN_LENGTH: usize = 255;

/// Converts text into a sequence of positioned tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    fn analyze(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &'static str;
}

/// Word-boundary analyzer with lowercasing and stop word removal.
///
/// Positions are assigned to emitted tokens only, so removed stop words do
/// not leave gaps: in "brown and fox", `fox` directly follows `brown`.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    stop_words: AHashSet<String>,
}

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer {
            stop_words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// An analyzer that keeps every word.
    pub fn without_stop_words() -> Self {
        StandardAnalyzer {
            stop_words: AHashSet::new(),
        }
    }

    pub fn with_stop_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StandardAnalyzer {
            stop_words: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        let normalized: String = text.nfkc().collect();
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for (offset, word) in normalized.unicode_word_indices() {
            if word.len() > MAX_TOKEN_LENGTH {
                continue;
            }
            let lowered = word.to_lowercase();
            if self.stop_words.contains(&lowered) {
                continue;
            }
            tokens.push(Token::new(lowered, position, offset, offset + word.len()));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Emits the whole (trimmed) value as a single token, unchanged.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        let start = text.len() - text.trim_start().len();
        vec![Token::new(trimmed, 0, start, start + trimmed.len())]
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Dispatches to a per-field analyzer, falling back to a default one.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzer {
    default: Arc<dyn Analyzer>,
    fields: AHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default: Arc<dyn Analyzer>) -> Self {
        PerFieldAnalyzer {
            default,
            fields: AHashMap::new(),
        }
    }

    pub fn add_analyzer<S: Into<String>>(&mut self, field: S, analyzer: Arc<dyn Analyzer>) {
        self.fields.insert(field.into(), analyzer);
    }

    pub fn with_analyzer<S: Into<String>>(mut self, field: S, analyzer: Arc<dyn Analyzer>) -> Self {
        self.add_analyzer(field, analyzer);
        self
    }

    pub fn analyzer_for(&self, field: &str) -> &Arc<dyn Analyzer> {
        self.fields.get(field).unwrap_or(&self.default)
    }

    pub fn analyze_field(&self, field: &str, text: &str) -> Vec<Token> {
        self.analyzer_for(field).analyze(text)
    }
}

impl Default for PerFieldAnalyzer {
    fn default() -> Self {
        PerFieldAnalyzer::new(Arc::new(StandardAnalyzer::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_standard_lowercases_and_splits() {
        let tokens = StandardAnalyzer::new().analyze("Quick, Brown FOX!");
        assert_eq!(texts(&tokens), vec!["quick", "brown", "fox"]);
        assert_eq!(tokens[2].position, 2);
        assert_eq!(tokens[1].start_offset, 7);
    }

    #[test]
    fn test_stop_words_leave_no_gaps() {
        let tokens = StandardAnalyzer::new().analyze("the brown and the fox");
        assert_eq!(texts(&tokens), vec!["brown", "fox"]);
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 1);
    }

    #[test]
    fn test_without_stop_words() {
        let tokens = StandardAnalyzer::without_stop_words().analyze("The fox");
        assert_eq!(texts(&tokens), vec!["the", "fox"]);
    }

    #[test]
    fn test_nfkc_normalization() {
        // full-width letters fold to ASCII
        let tokens = StandardAnalyzer::new().analyze("Ｒｕｓｔ");
        assert_eq!(texts(&tokens), vec!["rust"]);
    }

    #[test]
    fn test_keyword_keeps_value() {
        let tokens = KeywordAnalyzer::new().analyze("  a1.Content-42 ");
        assert_eq!(texts(&tokens), vec!["a1.Content-42"]);
        assert_eq!(tokens[0].start_offset, 2);
        assert!(KeywordAnalyzer::new().analyze("   ").is_empty());
    }

    #[test]
    fn test_per_field_dispatch() {
        let analyzer = PerFieldAnalyzer::default().with_analyzer("id", Arc::new(KeywordAnalyzer));
        assert_eq!(texts(&analyzer.analyze_field("id", "A.B")), vec!["A.B"]);
        assert_eq!(texts(&analyzer.analyze_field("body", "Big Dog")), vec!["big", "dog"]);
    }
}
