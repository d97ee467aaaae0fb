//! Query types and scoring.
//!
//! Queries are plain values. Before execution a query is rewritten against
//! a snapshot, which expands prefix queries into the matching terms; the
//! rewritten query is then scored one segment at a time.
//!
//! Scoring follows the classic vector-space formula: for a term,
//! `sqrt(freq) * idf^2 * boost / sqrt(field_length)`; boolean queries sum
//! their matching clauses and scale the sum by the fraction of clauses
//! that matched.

pub mod collector;
pub mod parser;

use std::fmt;

use ahash::{AHashMap, AHashSet};

use crate::error::{Result, SiftError};
use crate::lexical::segment::Segment;
use crate::lexical::snapshot::Snapshot;

/// Most terms a prefix query may expand to.
pub const MAX_CLAUSE_COUNT: usize = 1024;

/// A term in a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// Matches documents containing a term.
#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    term: Term,
    boost: f32,
}

impl TermQuery {
    pub fn new(term: Term) -> Self {
        TermQuery { term, boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn term(&self) -> &Term {
        &self.term
    }
}

/// Matches documents containing a term starting with a prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixQuery {
    prefix: Term,
    boost: f32,
}

impl PrefixQuery {
    pub fn new(prefix: Term) -> Self {
        PrefixQuery { prefix, boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn prefix(&self) -> &Term {
        &self.prefix
    }
}

/// Matches documents containing the terms at consecutive positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseQuery {
    field: String,
    terms: Vec<String>,
    boost: f32,
}

impl PhraseQuery {
    pub fn new<F: Into<String>>(field: F, terms: Vec<String>) -> Self {
        PhraseQuery {
            field: field.into(),
            terms,
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

/// Occurrence requirement of a boolean clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanClause {
    pub occur: Occur,
    pub query: Query,
}

impl BooleanClause {
    pub fn new(occur: Occur, query: Query) -> Self {
        BooleanClause { occur, query }
    }
}

/// Combines clauses with must / should / must-not semantics.
///
/// With at least one `Must` clause, hits must match all of them and
/// `Should` clauses only add to the score; otherwise hits must match at
/// least one `Should` clause. A query of only `MustNot` clauses matches
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanQuery {
    clauses: Vec<BooleanClause>,
    boost: f32,
}

impl BooleanQuery {
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            boost: 1.0,
        }
    }

    pub fn add(&mut self, occur: Occur, query: Query) {
        self.clauses.push(BooleanClause::new(occur, query));
    }

    pub fn with_clause(mut self, occur: Occur, query: Query) -> Self {
        self.add(occur, query);
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn clauses(&self) -> &[BooleanClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// A search query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term(TermQuery),
    Prefix(PrefixQuery),
    Phrase(PhraseQuery),
    Boolean(BooleanQuery),
}

impl From<TermQuery> for Query {
    fn from(query: TermQuery) -> Self {
        Query::Term(query)
    }
}

impl From<PrefixQuery> for Query {
    fn from(query: PrefixQuery) -> Self {
        Query::Prefix(query)
    }
}

impl From<PhraseQuery> for Query {
    fn from(query: PhraseQuery) -> Self {
        Query::Phrase(query)
    }
}

impl From<BooleanQuery> for Query {
    fn from(query: BooleanQuery) -> Self {
        Query::Boolean(query)
    }
}

type Scores = AHashMap<u32, f32>;

impl Query {
    pub fn boost(&self) -> f32 {
        match self {
            Query::Term(q) => q.boost,
            Query::Prefix(q) => q.boost,
            Query::Phrase(q) => q.boost,
            Query::Boolean(q) => q.boost,
        }
    }

    pub fn with_boost(self, boost: f32) -> Query {
        match self {
            Query::Term(q) => q.with_boost(boost).into(),
            Query::Prefix(q) => q.with_boost(boost).into(),
            Query::Phrase(q) => q.with_boost(boost).into(),
            Query::Boolean(q) => q.with_boost(boost).into(),
        }
    }

    /// Expand prefix queries into the terms they match in `snapshot`.
    pub fn rewrite(&self, snapshot: &Snapshot) -> Result<Query> {
        match self {
            Query::Prefix(q) => {
                let terms = snapshot.terms_with_prefix(&q.prefix.field, &q.prefix.text);
                if terms.len() > MAX_CLAUSE_COUNT {
                    return Err(SiftError::query(format!(
                        "prefix {} matches too many clauses ({} > {MAX_CLAUSE_COUNT})",
                        q.prefix,
                        terms.len()
                    )));
                }
                let mut rewritten = BooleanQuery::new().with_boost(q.boost);
                for text in terms {
                    let term = Term::new(q.prefix.field.clone(), text);
                    rewritten.add(Occur::Should, TermQuery::new(term).into());
                }
                Ok(rewritten.into())
            }
            Query::Boolean(q) => {
                let mut rewritten = BooleanQuery::new().with_boost(q.boost);
                for clause in &q.clauses {
                    rewritten.add(clause.occur, clause.query.rewrite(snapshot)?);
                }
                Ok(rewritten.into())
            }
            Query::Term(_) | Query::Phrase(_) => Ok(self.clone()),
        }
    }

    /// Terms the query looks for, in first-seen order without duplicates.
    ///
    /// Terms of `MustNot` clauses are left out. Prefix queries contribute
    /// nothing until rewritten.
    pub fn extract_terms(&self) -> Vec<Term> {
        let mut seen = AHashSet::new();
        let mut terms = Vec::new();
        self.collect_terms(&mut seen, &mut terms);
        terms
    }

    fn collect_terms(&self, seen: &mut AHashSet<Term>, terms: &mut Vec<Term>) {
        fn push(seen: &mut AHashSet<Term>, terms: &mut Vec<Term>, term: Term) {
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        match self {
            Query::Term(q) => push(seen, terms, q.term.clone()),
            Query::Phrase(q) => {
                for text in &q.terms {
                    push(seen, terms, Term::new(q.field.clone(), text.clone()));
                }
            }
            Query::Boolean(q) => {
                for clause in q.clauses.iter().filter(|c| c.occur != Occur::MustNot) {
                    clause.query.collect_terms(seen, terms);
                }
            }
            Query::Prefix(_) => {}
        }
    }

    /// Score every document of `segment` matching this (rewritten) query.
    ///
    /// Deleted documents are not filtered here.
    pub(crate) fn score_segment(&self, snapshot: &Snapshot, segment: &Segment) -> Scores {
        match self {
            Query::Term(q) => score_term(snapshot, segment, &q.term, q.boost),
            Query::Phrase(q) => score_phrase(snapshot, segment, q),
            Query::Boolean(q) => score_boolean(snapshot, segment, q),
            // Unreachable after rewrite; scores nothing.
            Query::Prefix(_) => Scores::new(),
        }
    }
}

fn length_norm(segment: &Segment, doc: u32, field: &str) -> f32 {
    segment
        .doc(doc)
        .and_then(|d| d.fields.get(field))
        .map(|f| 1.0 / (f.length.max(1) as f32).sqrt())
        .unwrap_or(1.0)
}

fn score_term(snapshot: &Snapshot, segment: &Segment, term: &Term, boost: f32) -> Scores {
    let postings = segment.postings(&term.field, &term.text);
    if postings.is_empty() {
        return Scores::new();
    }
    let idf = snapshot.idf(&term.field, &term.text);
    postings
        .iter()
        .map(|p| {
            let tf = (p.freq as f32).sqrt();
            let score = tf * idf * idf * boost * length_norm(segment, p.doc, &term.field);
            (p.doc, score)
        })
        .collect()
}

fn score_phrase(snapshot: &Snapshot, segment: &Segment, query: &PhraseQuery) -> Scores {
    match query.terms.as_slice() {
        [] => return Scores::new(),
        [single] => {
            let term = Term::new(query.field.clone(), single.clone());
            return score_term(snapshot, segment, &term, query.boost);
        }
        _ => {}
    }

    let idf: f32 = query
        .terms
        .iter()
        .map(|t| snapshot.idf(&query.field, t))
        .sum();
    let mut scores = Scores::new();

    // Documents containing the first term are the only candidates.
    for posting in segment.postings(&query.field, &query.terms[0]) {
        let Some(field) = segment
            .doc(posting.doc)
            .and_then(|d| d.fields.get(&query.field))
        else {
            continue;
        };
        let Some(positions) = query
            .terms
            .iter()
            .map(|t| field.terms.get(t))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };

        let freq = positions[0]
            .iter()
            .filter(|&&start| {
                positions[1..]
                    .iter()
                    .enumerate()
                    .all(|(i, p)| p.binary_search(&(start + i as u32 + 1)).is_ok())
            })
            .count();
        if freq > 0 {
            let score = (freq as f32).sqrt()
                * idf
                * idf
                * query.boost
                * length_norm(segment, posting.doc, &query.field);
            scores.insert(posting.doc, score);
        }
    }
    scores
}

fn score_boolean(snapshot: &Snapshot, segment: &Segment, query: &BooleanQuery) -> Scores {
    let mut required: Vec<Scores> = Vec::new();
    let mut optional: Vec<Scores> = Vec::new();
    let mut excluded: AHashSet<u32> = AHashSet::new();

    for clause in &query.clauses {
        let scores = clause.query.score_segment(snapshot, segment);
        match clause.occur {
            Occur::Must => required.push(scores),
            Occur::Should => optional.push(scores),
            Occur::MustNot => excluded.extend(scores.into_iter().map(|(doc, _)| doc)),
        }
    }

    let scoring_clauses = required.len() + optional.len();
    if scoring_clauses == 0 {
        return Scores::new();
    }

    let candidates: AHashSet<u32> = match required.split_first() {
        Some((first, rest)) => first
            .keys()
            .filter(|doc| rest.iter().all(|s| s.contains_key(*doc)))
            .copied()
            .collect(),
        None => optional.iter().flat_map(|s| s.keys().copied()).collect(),
    };

    candidates
        .into_iter()
        .filter(|doc| !excluded.contains(doc))
        .map(|doc| {
            let mut sum = 0.0;
            let mut matched = 0;
            for scores in required.iter().chain(optional.iter()) {
                if let Some(score) = scores.get(&doc) {
                    sum += score;
                    matched += 1;
                }
            }
            let coord = matched as f32 / scoring_clauses as f32;
            (doc, sum * coord * query.boost)
        })
        .collect()
}
