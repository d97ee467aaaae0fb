//! Query string parser.
//!
//! Parses the classic query syntax into a [`Query`].

use std::sync::Arc;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::analysis::PerFieldAnalyzer;
use crate::error::{Result, SiftError};
use crate::lexical::query::{BooleanQuery, Occur, PhraseQuery, PrefixQuery, Query, Term, TermQuery};

/// Pest grammar parser for query strings.
#[derive(Parser)]
#[grammar = "lexical/query/parser.pest"]
struct QueryStringParser;

/// Parser for query strings.
///
/// # Supported Syntax
///
/// - `fox`: term, searched in every default field
/// - `title:fox`: term in a single field
/// - `"quick brown"`: phrase
/// - `bro*`: prefix
/// - `+fox -dog`: required and prohibited clauses; bare clauses are optional
/// - `fox^2`: boost
///
/// Terms and phrases go through the field's analyzer. Prefixes are only
/// lowercased, and left as they are on keyword fields.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use sift::analysis::PerFieldAnalyzer;
/// use sift::lexical::QueryParser;
///
/// let parser = QueryParser::new(Arc::new(PerFieldAnalyzer::default()))
///     .with_default_fields(vec!["title".into(), "body".into()]);
/// let query = parser.parse("+brown fox*").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct QueryParser {
    default_fields: Vec<String>,
    analyzer: Arc<PerFieldAnalyzer>,
}

impl QueryParser {
    /// Create a parser with no default fields.
    pub fn new(analyzer: Arc<PerFieldAnalyzer>) -> Self {
        QueryParser {
            default_fields: Vec::new(),
            analyzer,
        }
    }

    /// Set a single default field for clauses without a field prefix.
    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_fields = vec![field.into()];
        self
    }

    /// Set the default fields for clauses without a field prefix.
    pub fn with_default_fields(mut self, fields: Vec<String>) -> Self {
        self.default_fields = fields;
        self
    }

    pub fn default_fields(&self) -> &[String] {
        &self.default_fields
    }

    /// Parse a query string.
    ///
    /// A single optional clause is returned as is; anything else becomes a
    /// [`BooleanQuery`]. Clauses that analyze to nothing (stop words only)
    /// are dropped.
    pub fn parse(&self, query_str: &str) -> Result<Query> {
        let pairs = QueryStringParser::parse(Rule::query, query_str)
            .map_err(|e| SiftError::query(format!("Failed to parse query: {e}")))?;

        let mut clauses = Vec::new();
        for pair in pairs {
            if pair.as_rule() == Rule::query {
                for inner in pair.into_inner() {
                    if inner.as_rule() == Rule::clause {
                        if let Some(clause) = self.parse_clause(inner)? {
                            clauses.push(clause);
                        }
                    }
                }
            }
        }

        if clauses.len() == 1 && clauses[0].0 == Occur::Should {
            return Ok(clauses.remove(0).1);
        }

        let mut query = BooleanQuery::new();
        for (occur, clause) in clauses {
            query.add(occur, clause);
        }
        Ok(query.into())
    }

    /// Parse a single clause (e.g. `+title:"quick brown"^2`).
    fn parse_clause(&self, pair: Pair<Rule>) -> Result<Option<(Occur, Query)>> {
        let mut occur = Occur::Should;
        let mut field_name: Option<String> = None;
        let mut body: Option<ClauseBody> = None;
        let mut boost: Option<f32> = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::occur => {
                    occur = if inner.as_str() == "+" {
                        Occur::Must
                    } else {
                        Occur::MustNot
                    };
                }
                Rule::field_prefix => {
                    for fp_inner in inner.into_inner() {
                        if fp_inner.as_rule() == Rule::field_name {
                            field_name = Some(fp_inner.as_str().to_string());
                        }
                    }
                }
                Rule::phrase => {
                    let text = inner
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::inner_text)
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default();
                    body = Some(ClauseBody::Phrase(text));
                }
                Rule::prefix_term => {
                    let text = inner
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::term_text)
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default();
                    body = Some(ClauseBody::Prefix(text));
                }
                Rule::term => {
                    body = Some(ClauseBody::Term(inner.as_str().to_string()));
                }
                Rule::boost => {
                    for b_inner in inner.into_inner() {
                        if b_inner.as_rule() == Rule::float_value {
                            boost = Some(b_inner.as_str().parse::<f32>().map_err(|e| {
                                SiftError::query(format!("Invalid boost value: {e}"))
                            })?);
                        }
                    }
                }
                _ => {}
            }
        }

        let body = body.ok_or_else(|| SiftError::query("Clause without a term"))?;
        let fields = match field_name {
            Some(field) => vec![field],
            None if self.default_fields.is_empty() => {
                return Err(SiftError::query(
                    "No field specified and no default field configured",
                ));
            }
            None => self.default_fields.clone(),
        };

        let mut per_field: Vec<Query> = fields
            .iter()
            .filter_map(|field| self.field_query(field, &body))
            .collect();
        let query = match per_field.len() {
            0 => return Ok(None),
            1 => per_field.remove(0),
            _ => {
                let mut any = BooleanQuery::new();
                for q in per_field {
                    any.add(Occur::Should, q);
                }
                any.into()
            }
        };

        let query = match boost {
            Some(boost) => query.with_boost(boost),
            None => query,
        };
        Ok(Some((occur, query)))
    }

    fn field_query(&self, field: &str, body: &ClauseBody) -> Option<Query> {
        match body {
            ClauseBody::Prefix(text) => {
                let text = if self.analyzer.analyzer_for(field).name() == "keyword" {
                    text.clone()
                } else {
                    text.to_lowercase()
                };
                Some(PrefixQuery::new(Term::new(field, text)).into())
            }
            ClauseBody::Term(text) => {
                let mut terms = self.analyze(field, text);
                match terms.len() {
                    0 => None,
                    1 => Some(TermQuery::new(Term::new(field, terms.remove(0))).into()),
                    _ => {
                        let mut any = BooleanQuery::new();
                        for term in terms {
                            any.add(Occur::Should, TermQuery::new(Term::new(field, term)).into());
                        }
                        Some(any.into())
                    }
                }
            }
            ClauseBody::Phrase(text) => {
                let mut terms = self.analyze(field, text);
                match terms.len() {
                    0 => None,
                    1 => Some(TermQuery::new(Term::new(field, terms.remove(0))).into()),
                    _ => Some(PhraseQuery::new(field, terms).into()),
                }
            }
        }
    }

    fn analyze(&self, field: &str, text: &str) -> Vec<String> {
        self.analyzer
            .analyze_field(field, text)
            .into_iter()
            .map(|token| token.text)
            .collect()
    }
}

enum ClauseBody {
    Term(String),
    Phrase(String),
    Prefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::KeywordAnalyzer;

    fn parser() -> QueryParser {
        let analyzer = PerFieldAnalyzer::default().with_analyzer("id", Arc::new(KeywordAnalyzer));
        QueryParser::new(Arc::new(analyzer)).with_default_field("body")
    }

    fn term(field: &str, text: &str) -> Query {
        TermQuery::new(Term::new(field, text)).into()
    }

    #[test]
    fn test_single_term() {
        assert_eq!(parser().parse("Fox").unwrap(), term("body", "fox"));
        assert_eq!(parser().parse("id:App.1").unwrap(), term("id", "App.1"));
    }

    #[test]
    fn test_occur_and_boost() {
        let query = parser().parse("+brown -dog fox^2").unwrap();
        let expected = BooleanQuery::new()
            .with_clause(Occur::Must, term("body", "brown"))
            .with_clause(Occur::MustNot, term("body", "dog"))
            .with_clause(Occur::Should, term("body", "fox").with_boost(2.0));
        assert_eq!(query, Query::from(expected));
    }

    #[test]
    fn test_phrase_and_prefix() {
        let query = parser().parse(r#""Quick Brown" Bro*"#).unwrap();
        let expected = BooleanQuery::new()
            .with_clause(
                Occur::Should,
                PhraseQuery::new("body", vec!["quick".to_string(), "brown".to_string()]).into(),
            )
            .with_clause(Occur::Should, PrefixQuery::new(Term::new("body", "bro")).into());
        assert_eq!(query, Query::from(expected));
    }

    #[test]
    fn test_multiple_default_fields() {
        let parser = parser().with_default_fields(vec!["title".to_string(), "body".to_string()]);
        let query = parser.parse("fox").unwrap();
        let expected = BooleanQuery::new()
            .with_clause(Occur::Should, term("title", "fox"))
            .with_clause(Occur::Should, term("body", "fox"));
        assert_eq!(query, Query::from(expected));
    }

    #[test]
    fn test_stop_words_are_dropped() {
        let query = parser().parse("the").unwrap();
        assert_eq!(query, Query::from(BooleanQuery::new()));
    }

    #[test]
    fn test_malformed_queries() {
        for input in ["", "   ", r#""unbalanced"#, "fox^", "title:", "(fox)"] {
            let result = parser().parse(input);
            assert!(
                matches!(result, Err(SiftError::Query(_))),
                "expected a query error for {input:?}"
            );
        }
    }
}
