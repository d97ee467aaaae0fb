//! # Sift
//!
//! An embeddable full-text search engine for technical content.
//!
//! ## Features
//!
//! - Segment-based inverted index with pluggable storage backends
//! - Asynchronous, single-writer mutation queue with idle flush and optimize
//! - Point-in-time snapshots refreshed in the background
//! - Query string parsing with required, optional and prohibited clauses
//! - Phrase hints mined from term vectors
// Core modules
pub mod analysis;
pub mod config;
pub mod content;
mod error;
pub mod indexer;
pub mod lexical;
pub mod provider;
pub mod service;
pub mod storage;
pub mod suggest;

// Re-exports for the public API
pub use analysis::{Analyzer, PerFieldAnalyzer, StandardAnalyzer};
pub use config::{AnalysisConfig, EngineConfig};
pub use content::{ContentFields, DocumentId, FieldSet, SourceCodeSnippet};
pub use error::{Result, SiftError};
pub use indexer::{Indexer, IndexerConfig, IndexerState, OptimizingFlag};
pub use provider::{ProviderConfig, RefreshOutcome, SnapshotProvider};
pub use service::{SearchHit, SearchResults, SearchService};
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use suggest::{PhraseCandidate, PhraseMiner};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
