//! Text analysis.
//!
//! Analyzers turn field text into a stream of positioned tokens. The same
//! analyzer chain runs at index time (inside the writer) and at query time
//! (inside the query parser), so both sides agree on term spelling.
//!
//! ```text
//! Text → NFKC → word boundaries → lowercase → stop words → Tokens
//! ```

pub mod analyzer;
pub mod token;

pub use analyzer::{Analyzer, KeywordAnalyzer, PerFieldAnalyzer, StandardAnalyzer};
pub use token::Token;
