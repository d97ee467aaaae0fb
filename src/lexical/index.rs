//! The inverted index handle.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use log::{debug, error, warn};
use parking_lot::RwLock;
use rayon::prelude::*;
use uuid::Uuid;

use crate::analysis::PerFieldAnalyzer;
use crate::error::{Result, SiftError};
use crate::lexical::commit::{COMMIT_FILE, CommitPoint, SegmentMeta};
use crate::lexical::segment::Segment;
use crate::lexical::snapshot::{Snapshot, SnapshotSegment};
use crate::lexical::writer::{InvertedIndexWriter, InvertedIndexWriterConfig};
use crate::storage::Storage;

/// Name of the write lock file.
pub const WRITE_LOCK_FILE: &str = "write.lock";

/// How often opening a snapshot is retried when a commit lands mid-open.
const OPEN_SNAPSHOT_ATTEMPTS: usize = 3;

/// A segment-based inverted index stored in a [`Storage`].
///
/// The index hands out at most one writer at a time and any number of
/// snapshots. Loaded segments are cached and shared between snapshots; the
/// cache only keeps segments referenced by the latest commit point a
/// snapshot was opened on.
#[derive(Debug)]
pub struct InvertedIndex {
    storage: Arc<dyn Storage>,
    analyzer: Arc<PerFieldAnalyzer>,
    segments: RwLock<AHashMap<String, Arc<Segment>>>,
    writer_open: AtomicBool,
}

impl InvertedIndex {
    /// Open (or create) an index in the given storage.
    pub fn open(storage: Arc<dyn Storage>, analyzer: Arc<PerFieldAnalyzer>) -> Result<Arc<Self>> {
        // Fail fast on an unreadable commit point.
        let commit = CommitPoint::read(storage.as_ref())?;
        if let Some(commit) = &commit {
            debug!(
                "Opened index at generation {} with {} segments",
                commit.generation,
                commit.segments.len()
            );
        }

        Ok(Arc::new(InvertedIndex {
            storage,
            analyzer,
            segments: RwLock::new(AHashMap::new()),
            writer_open: AtomicBool::new(false),
        }))
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn analyzer(&self) -> &Arc<PerFieldAnalyzer> {
        &self.analyzer
    }

    pub fn read_commit(&self) -> Result<CommitPoint> {
        CommitPoint::read_or_default(self.storage.as_ref())
    }

    /// Generation of the latest commit point.
    pub fn committed_generation(&self) -> Result<u64> {
        Ok(self.read_commit()?.generation)
    }

    /// Open the single writer of this index.
    ///
    /// A lock file left behind by a writer that was never closed is broken
    /// with an error log. A second writer on the same handle is refused.
    pub fn writer(self: &Arc<Self>, config: InvertedIndexWriterConfig) -> Result<InvertedIndexWriter> {
        if self.writer_open.swap(true, Ordering::AcqRel) {
            return Err(SiftError::invalid_operation(
                "a writer is already open on this index",
            ));
        }

        match self.open_writer(config) {
            Ok(writer) => Ok(writer),
            Err(e) => {
                self.writer_open.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn open_writer(self: &Arc<Self>, config: InvertedIndexWriterConfig) -> Result<InvertedIndexWriter> {
        let token = Uuid::new_v4().to_string();
        if !self.storage.create_exclusive(WRITE_LOCK_FILE, token.as_bytes())? {
            error!("Index is locked by another writer; forcing unlock");
            self.storage.delete_file(WRITE_LOCK_FILE)?;
            if !self.storage.create_exclusive(WRITE_LOCK_FILE, token.as_bytes())? {
                return Err(SiftError::storage("could not obtain the index write lock"));
            }
        }

        let commit = self.read_commit()?;
        self.delete_unreferenced_segments(&commit);

        Ok(InvertedIndexWriter::new(Arc::clone(self), config, commit, token))
    }

    pub(crate) fn release_writer(&self, token: &str) -> Result<()> {
        let result = match self.storage.read_bytes(WRITE_LOCK_FILE) {
            Ok(held) if held == token.as_bytes() => self.storage.delete_file(WRITE_LOCK_FILE),
            Ok(_) => {
                warn!("Write lock is held by another writer; leaving it in place");
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.writer_open.store(false, Ordering::Release);
        result
    }

    /// Remove segment files left by a writer that died before committing.
    fn delete_unreferenced_segments(&self, commit: &CommitPoint) {
        let files = match self.storage.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list index files: {e}");
                return;
            }
        };
        for file in files {
            let Some(name) = file.strip_suffix(".json") else {
                continue;
            };
            if file == COMMIT_FILE || !name.starts_with("seg_") || commit.references(name) {
                continue;
            }
            match self.storage.delete_file(&file) {
                Ok(()) => debug!("Deleted unreferenced segment file {file}"),
                Err(e) => warn!("Failed to delete unreferenced segment file {file}: {e}"),
            }
        }
    }

    /// Open a snapshot of the latest commit point.
    pub fn open_snapshot(self: &Arc<Self>) -> Result<Snapshot> {
        let mut last_error = None;
        for attempt in 1..=OPEN_SNAPSHOT_ATTEMPTS {
            let commit = self.read_commit()?;
            match self.load_segments(&commit) {
                Ok(segments) => {
                    self.retain_cached(&commit);
                    return Ok(Snapshot::new(Arc::clone(self), commit.generation, segments));
                }
                Err(e) => {
                    // A concurrent optimize may have removed a segment of the
                    // commit we read; the next read sees the new commit.
                    debug!("Opening snapshot failed on attempt {attempt}: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SiftError::index("failed to open snapshot")))
    }

    fn load_segments(&self, commit: &CommitPoint) -> Result<Vec<SnapshotSegment>> {
        commit
            .segments
            .par_iter()
            .map(|meta| {
                let segment = self.load_segment(meta)?;
                Ok(SnapshotSegment::new(segment, meta.deleted.clone()))
            })
            .collect()
    }

    /// Load a segment through the cache.
    pub(crate) fn load_segment(&self, meta: &SegmentMeta) -> Result<Arc<Segment>> {
        if let Some(segment) = self.segments.read().get(&meta.name) {
            return Ok(Arc::clone(segment));
        }

        let bytes = self.storage.read_bytes(&Segment::file_name(&meta.name))?;
        let segment = Arc::new(Segment::decode(&bytes, meta.checksum)?);
        if segment.doc_count() != meta.doc_count {
            return Err(SiftError::index(format!(
                "segment {} holds {} documents, commit point expects {}",
                meta.name,
                segment.doc_count(),
                meta.doc_count
            )));
        }
        self.cache_segment(Arc::clone(&segment));
        Ok(segment)
    }

    pub(crate) fn cache_segment(&self, segment: Arc<Segment>) {
        self.segments
            .write()
            .insert(segment.name().to_string(), segment);
    }

    fn retain_cached(&self, commit: &CommitPoint) {
        let live: BTreeSet<&str> = commit.segments.iter().map(|s| s.name.as_str()).collect();
        let mut cache = self.segments.write();
        // Keep segments a writer flushed after this commit was read.
        let newest = commit.next_segment;
        cache.retain(|name, _| {
            live.contains(name.as_str()) || segment_number(name).is_some_and(|n| n >= newest)
        });
    }
}

fn segment_number(name: &str) -> Option<u64> {
    name.strip_prefix("seg_")?.parse().ok()
}
