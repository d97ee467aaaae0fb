//! Phrase hints.
//!
//! Given the first letters of a word, [`PhraseMiner`] proposes up to three
//! one-word, three two-word and three three-word queries taken from the
//! `body` text of indexed documents. The prefix is expanded to the indexed
//! terms it matches; for each term, the documents containing it are scanned
//! and every occurrence of the term is completed with the word that follows
//! it, or the two words that follow it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::analysis::PerFieldAnalyzer;
use crate::content::BODY_FIELD;
use crate::error::Result;
use crate::lexical::{DocAddress, Query, QueryParser, Snapshot, Term, TermQuery};

/// Most hints of each length.
pub const ONE_WORD_MAX: usize = 3;
pub const TWO_WORD_MAX: usize = 3;
pub const THREE_WORD_MAX: usize = 3;

/// A suggested query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhraseCandidate {
    OneWord(String),
    TwoWord(String, String),
    ThreeWord(String, String, String),
}

impl fmt::Display for PhraseCandidate {
    /// Every word is required: `+brown +fox`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhraseCandidate::OneWord(a) => write!(f, "+{a}"),
            PhraseCandidate::TwoWord(a, b) => write!(f, "+{a} +{b}"),
            PhraseCandidate::ThreeWord(a, b, c) => write!(f, "+{a} +{b} +{c}"),
        }
    }
}

/// Words following one occurrence of the anchor term.
#[derive(Debug, Default)]
struct Completion<'a> {
    second: Option<&'a str>,
    third: Option<&'a str>,
}

#[derive(Debug, Default)]
struct Candidates {
    one: Vec<PhraseCandidate>,
    two: Vec<PhraseCandidate>,
    three: Vec<PhraseCandidate>,
}

impl Candidates {
    fn multi_word_full(&self) -> bool {
        self.two.len() >= TWO_WORD_MAX && self.three.len() >= THREE_WORD_MAX
    }

    fn full(&self) -> bool {
        self.one.len() >= ONE_WORD_MAX && self.multi_word_full()
    }

    fn into_vec(self) -> Vec<PhraseCandidate> {
        let mut all = self.one;
        all.extend(self.two);
        all.extend(self.three);
        all
    }
}

fn push_unique(list: &mut Vec<PhraseCandidate>, candidate: PhraseCandidate) {
    if !list.contains(&candidate) {
        list.push(candidate);
    }
}

/// Mines phrase hints from a snapshot.
#[derive(Debug, Clone)]
pub struct PhraseMiner {
    parser: QueryParser,
}

impl PhraseMiner {
    pub fn new(analyzer: Arc<PerFieldAnalyzer>) -> Self {
        PhraseMiner {
            parser: QueryParser::new(analyzer).with_default_field(BODY_FIELD),
        }
    }

    /// Hints for `raw`: one-word hints first, then two-word, then three-word.
    ///
    /// Returns nothing when the trimmed input is empty or is not plain ASCII
    /// letters and digits.
    ///
    /// A phrase found in several documents is returned once, so a repetitive
    /// corpus can yield fewer than three two-word or three-word hints.
    pub fn suggest(&self, snapshot: &Snapshot, raw: &str) -> Result<Vec<PhraseCandidate>> {
        let word = raw.trim();
        if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Ok(Vec::new());
        }

        let query = self.parser.parse(&format!("{word}*"))?.rewrite(snapshot)?;
        let mut candidates = Candidates::default();

        for term in query.extract_terms() {
            let text = term.text;
            if candidates.one.len() < ONE_WORD_MAX {
                push_unique(&mut candidates.one, PhraseCandidate::OneWord(text.clone()));
            }

            if !candidates.multi_word_full() {
                let hits = snapshot.search(
                    &Query::from(TermQuery::new(Term::new(BODY_FIELD, text.clone()))),
                    usize::MAX,
                )?;
                for hit in hits.hits {
                    if candidates.multi_word_full() {
                        break;
                    }
                    mine_document(snapshot, hit.address, &text, &mut candidates);
                }
            }

            if candidates.full() {
                break;
            }
        }

        Ok(candidates.into_vec())
    }
}

/// Complete every occurrence of `anchor` in the document's body.
fn mine_document(snapshot: &Snapshot, address: DocAddress, anchor: &str, candidates: &mut Candidates) {
    let Some(vector) = snapshot.term_vector(address, BODY_FIELD) else {
        return;
    };
    let Some(anchor_positions) = vector.positions(anchor) else {
        return;
    };

    // anchor position -> its ordinal among the anchor's occurrences
    let ordinals: BTreeMap<u32, usize> = anchor_positions
        .iter()
        .enumerate()
        .map(|(ordinal, &position)| (position, ordinal))
        .collect();

    let mut completions: BTreeMap<usize, Completion<'_>> = BTreeMap::new();
    for (word, positions) in vector.terms() {
        for &position in positions {
            let previous = position.checked_sub(1).and_then(|p| ordinals.get(&p));
            let before_previous = position.checked_sub(2).and_then(|p| ordinals.get(&p));
            if let Some(&ordinal) = previous {
                completions.entry(ordinal).or_default().second = Some(word);
            } else if let Some(&ordinal) = before_previous {
                completions.entry(ordinal).or_default().third = Some(word);
            }
        }
    }

    for completion in completions.values() {
        match (completion.second, completion.third) {
            (Some(second), third)
                if candidates.two.len() < TWO_WORD_MAX
                    && (third.is_none() || candidates.three.len() >= THREE_WORD_MAX) =>
            {
                push_unique(
                    &mut candidates.two,
                    PhraseCandidate::TwoWord(anchor.to_string(), second.to_string()),
                );
            }
            (Some(second), Some(third)) if candidates.three.len() < THREE_WORD_MAX => {
                push_unique(
                    &mut candidates.three,
                    PhraseCandidate::ThreeWord(
                        anchor.to_string(),
                        second.to_string(),
                        third.to_string(),
                    ),
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::{Document, FieldOption, InvertedIndex, InvertedIndexWriterConfig, LexicalIndexWriter};
    use crate::storage::Storage;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn snapshot_of(bodies: &[&str]) -> Snapshot {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let index = InvertedIndex::open(storage, Arc::new(PerFieldAnalyzer::default())).unwrap();
        let mut writer = index.writer(InvertedIndexWriterConfig::default()).unwrap();
        for (i, body) in bodies.iter().enumerate() {
            let doc = Document::new(format!("t.{i}")).with_field(
                BODY_FIELD,
                *body,
                FieldOption::text().with_term_vectors(),
            );
            writer.add_document(doc).unwrap();
        }
        writer.close().unwrap();
        index.open_snapshot().unwrap()
    }

    fn suggest(snapshot: &Snapshot, raw: &str) -> Vec<String> {
        PhraseMiner::new(Arc::new(PerFieldAnalyzer::default()))
            .suggest(snapshot, raw)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_two_and_three_word_hints() {
        let snapshot = snapshot_of(&["quick brown fox", "brown fox jumps"]);
        assert_eq!(
            suggest(&snapshot, "bro"),
            vec!["+brown", "+brown +fox", "+brown +fox +jumps"]
        );
    }

    #[test]
    fn test_invalid_input_yields_nothing() {
        let snapshot = snapshot_of(&["quick brown fox"]);
        assert!(suggest(&snapshot, "").is_empty());
        assert!(suggest(&snapshot, "   ").is_empty());
        assert!(suggest(&snapshot, "bro wn").is_empty());
        assert!(suggest(&snapshot, "bro-").is_empty());
        assert!(suggest(&snapshot, "zzz").is_empty());
    }

    #[test]
    fn test_input_is_trimmed_and_lowercased() {
        let snapshot = snapshot_of(&["quick brown fox"]);
        assert_eq!(suggest(&snapshot, "  BRO "), vec!["+brown", "+brown +fox"]);
    }

    #[test]
    fn test_caps() {
        let snapshot = snapshot_of(&[
            "fa fb fc fd fe",
            "fa fc fe fb fd",
            "fb fa fd fc fe fa fe",
        ]);
        let hints = PhraseMiner::new(Arc::new(PerFieldAnalyzer::default()))
            .suggest(&snapshot, "f")
            .unwrap();

        let count = |n: usize| {
            hints
                .iter()
                .filter(|h| match h {
                    PhraseCandidate::OneWord(_) => n == 1,
                    PhraseCandidate::TwoWord(..) => n == 2,
                    PhraseCandidate::ThreeWord(..) => n == 3,
                })
                .count()
        };
        assert_eq!(count(1), 3);
        assert!(count(2) <= 3);
        assert!(count(3) <= 3);
        assert_eq!(hints[0], PhraseCandidate::OneWord("fa".to_string()));

        // one-word, then two-word, then three-word
        let lengths: Vec<usize> = hints
            .iter()
            .map(|h| h.to_string().split(' ').count())
            .collect();
        let mut sorted = lengths.clone();
        sorted.sort();
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn test_duplicate_phrases_are_emitted_once() {
        let snapshot = snapshot_of(&["brown fox", "brown fox", "brown fox"]);
        assert_eq!(suggest(&snapshot, "brown"), vec!["+brown", "+brown +fox"]);
    }
}
