//! Engine configuration.
//!
//! Every section has defaults, so an empty JSON object is a valid
//! configuration:
//!
//! ```json
//! {
//!   "storage": { "type": "file", "path": "/var/lib/sift/index" },
//!   "indexer": { "idle_timeout_ms": 30000, "optimize_threshold": 400 },
//!   "provider": { "refresh_interval_secs": 120 },
//!   "analysis": { "stop_words": ["a", "the"] }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::StandardAnalyzer;
use crate::error::Result;
use crate::indexer::IndexerConfig;
use crate::provider::ProviderConfig;
use crate::storage::StorageConfig;

/// Text analysis settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Stop words removed from tokenized fields. The English list when
    /// absent; an empty list keeps every word.
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
}

impl AnalysisConfig {
    pub fn standard_analyzer(&self) -> StandardAnalyzer {
        match &self.stop_words {
            Some(words) => StandardAnalyzer::with_stop_words(words.iter().cloned()),
            None => StandardAnalyzer::new(),
        }
    }
}

/// Configuration of a [`SearchService`](crate::service::SearchService).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
