//! Commit points.
//!
//! The commit point (`segments.json`) is the single source of truth for
//! what a reader sees: the generation number, the segments in order and the
//! deleted document ordinals of each. It is replaced atomically by writing a
//! temporary file and renaming it over the previous one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::Storage;

pub const COMMIT_FILE: &str = "segments.json";
const COMMIT_TEMP_FILE: &str = "segments.json.tmp";

/// A segment as referenced by a commit point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: String,
    pub doc_count: u32,
    /// CRC32 of the segment file.
    pub checksum: u32,
    /// Ordinals of deleted documents.
    #[serde(default)]
    pub deleted: BTreeSet<u32>,
}

impl SegmentMeta {
    pub fn live_count(&self) -> u32 {
        self.doc_count.saturating_sub(self.deleted.len() as u32)
    }
}

/// A committed state of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitPoint {
    /// Incremented by every commit. Generation 0 is the empty index.
    pub generation: u64,
    /// Number used to name the next segment.
    pub next_segment: u64,
    pub segments: Vec<SegmentMeta>,
}

impl CommitPoint {
    /// Read the latest commit point, or `None` for a fresh index.
    pub fn read(storage: &dyn Storage) -> Result<Option<CommitPoint>> {
        if !storage.file_exists(COMMIT_FILE) {
            return Ok(None);
        }
        let bytes = storage.read_bytes(COMMIT_FILE)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Read the latest commit point, treating a fresh index as generation 0.
    pub fn read_or_default(storage: &dyn Storage) -> Result<CommitPoint> {
        Ok(Self::read(storage)?.unwrap_or_default())
    }

    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        storage.write_bytes(COMMIT_TEMP_FILE, &bytes)?;
        storage.rename_file(COMMIT_TEMP_FILE, COMMIT_FILE)
    }

    pub fn live_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }

    pub fn has_deletions(&self) -> bool {
        self.segments.iter().any(|s| !s.deleted.is_empty())
    }

    pub fn references(&self, segment_name: &str) -> bool {
        self.segments.iter().any(|s| s.name == segment_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    #[test]
    fn test_fresh_index_has_no_commit() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        assert!(CommitPoint::read(&storage).unwrap().is_none());
        assert_eq!(CommitPoint::read_or_default(&storage).unwrap().generation, 0);
    }

    #[test]
    fn test_write_replaces_atomically() {
        let storage = MemoryStorage::new(MemoryStorageConfig::default());
        let mut commit = CommitPoint {
            generation: 1,
            next_segment: 1,
            segments: vec![SegmentMeta {
                name: "seg_000000".to_string(),
                doc_count: 3,
                checksum: 7,
                deleted: BTreeSet::from([1]),
            }],
        };
        commit.write(&storage).unwrap();
        commit.generation = 2;
        commit.write(&storage).unwrap();

        let read = CommitPoint::read(&storage).unwrap().unwrap();
        assert_eq!(read, commit);
        assert_eq!(read.live_docs(), 2);
        assert!(read.has_deletions());
        assert!(!storage.file_exists(COMMIT_TEMP_FILE));
    }
}
