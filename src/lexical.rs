//! Segment-based inverted index.
//!
//! This is the storage and query engine everything else is built on. It is
//! intentionally small: documents are analyzed into per-field term position
//! maps, buffered by a single writer, and written as immutable segments.
//! A commit point lists the live segments and their deletions; readers open
//! a [`Snapshot`] of one commit point and never see later changes.
//!
//! # Module Structure
//!
//! - `document`: index documents and per-field options
//! - `segment`: immutable segment files and their in-memory postings
//! - `commit`: the commit point (`segments.json`)
//! - `index`: [`InvertedIndex`], the handle that opens writers and snapshots
//! - `writer`: the [`LexicalIndexWriter`] trait and its implementation
//! - `snapshot`: point-in-time readers, term vectors, query execution
//! - `query`: query types, scoring, collectors and the query parser

pub mod commit;
pub mod document;
pub mod index;
pub mod query;
pub mod segment;
pub mod snapshot;
pub mod writer;

pub use document::{Document, Field, FieldOption, Indexing, KEY_FIELD};
pub use index::InvertedIndex;
pub use query::parser::QueryParser;
pub use query::{BooleanClause, BooleanQuery, Occur, PhraseQuery, PrefixQuery, Query, Term, TermQuery};
pub use snapshot::{DocAddress, ScoredDoc, Snapshot, StoredDocument, TermVector, TopDocs};
pub use writer::{InvertedIndexWriter, InvertedIndexWriterConfig, LexicalIndexWriter};
