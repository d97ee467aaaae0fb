//! Index writers.
//!
//! [`LexicalIndexWriter`] is the seam the mutation worker drives; the
//! worker never sees the concrete writer type, so tests can substitute
//! their own implementation.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{Analyzer, KeywordAnalyzer};
use crate::error::{Result, SiftError};
use crate::lexical::commit::{CommitPoint, SegmentMeta};
use crate::lexical::document::{Document, Indexing};
use crate::lexical::index::InvertedIndex;
use crate::lexical::segment::{IndexedField, Segment, SegmentDocument};

/// Operations the mutation worker needs from an index writer.
pub trait LexicalIndexWriter: Send + std::fmt::Debug {
    /// Buffer a document. It becomes visible to snapshots after a commit.
    fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Delete every document stored under `key`, buffered or committed.
    ///
    /// Returns the number of documents deleted. A missing key is not an error.
    fn delete_documents(&mut self, key: &str) -> Result<usize>;

    /// Flush buffered documents and publish a new commit point.
    fn commit(&mut self) -> Result<()>;

    /// Merge all segments into one, dropping deleted documents, and commit.
    fn optimize(&mut self) -> Result<()>;

    /// Whether there are changes not yet committed.
    fn pending_changes(&self) -> bool;

    /// Commit and release the write lock. Further calls fail.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Configuration for [`InvertedIndexWriter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedIndexWriterConfig {
    /// Buffered documents are written as a segment once this many pile up.
    #[serde(default = "default_max_buffered_docs")]
    pub max_buffered_docs: usize,
}

fn default_max_buffered_docs() -> usize {
    1000
}

impl Default for InvertedIndexWriterConfig {
    fn default() -> Self {
        InvertedIndexWriterConfig {
            max_buffered_docs: default_max_buffered_docs(),
        }
    }
}

/// The writer of an [`InvertedIndex`].
#[derive(Debug)]
pub struct InvertedIndexWriter {
    index: Arc<InvertedIndex>,
    config: InvertedIndexWriterConfig,
    commit: CommitPoint,
    buffer: Vec<SegmentDocument>,
    dirty: bool,
    lock_token: String,
    closed: bool,
}

impl InvertedIndexWriter {
    pub(crate) fn new(
        index: Arc<InvertedIndex>,
        config: InvertedIndexWriterConfig,
        commit: CommitPoint,
        lock_token: String,
    ) -> Self {
        InvertedIndexWriter {
            index,
            config,
            commit,
            buffer: Vec::new(),
            dirty: false,
            lock_token,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(SiftError::invalid_operation("index writer is closed"));
        }
        Ok(())
    }

    fn analyze(&self, doc: Document) -> SegmentDocument {
        let analyzer = self.index.analyzer();
        let mut stored = Vec::new();
        let mut fields: BTreeMap<String, IndexedField> = BTreeMap::new();

        for field in doc.fields() {
            if field.option.stored {
                stored.push((field.name.clone(), field.value.clone()));
            }
            let tokens = match field.option.indexing {
                Indexing::No => continue,
                Indexing::Keyword => KeywordAnalyzer.analyze(&field.value),
                Indexing::Tokenized => analyzer.analyze_field(&field.name, &field.value),
            };
            if tokens.is_empty() {
                continue;
            }

            let indexed = fields
                .entry(field.name.clone())
                .or_insert_with(|| IndexedField {
                    length: 0,
                    term_vectors: false,
                    terms: BTreeMap::new(),
                });
            indexed.term_vectors |= field.option.term_vectors;

            // Repeated fields continue where the previous value stopped.
            let offset = indexed.length;
            let mut end = offset;
            for token in tokens {
                let position = offset + token.position;
                end = end.max(position + 1);
                indexed.terms.entry(token.text).or_default().push(position);
            }
            indexed.length = end;
        }

        SegmentDocument {
            key: doc.key().to_string(),
            stored,
            fields,
        }
    }

    /// Write buffered documents as a new segment. Does not commit.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let name = format!("seg_{:06}", self.commit.next_segment);
        let segment = Segment::new(name.clone(), mem::take(&mut self.buffer));
        self.write_segment(segment)?;
        self.commit.next_segment += 1;
        Ok(())
    }

    fn write_segment(&mut self, segment: Segment) -> Result<()> {
        let bytes = segment.encode()?;
        let checksum = crc32fast::hash(&bytes);
        self.index
            .storage()
            .write_bytes(&Segment::file_name(segment.name()), &bytes)?;

        debug!(
            "Wrote segment {} with {} documents",
            segment.name(),
            segment.doc_count()
        );
        self.commit.segments.push(SegmentMeta {
            name: segment.name().to_string(),
            doc_count: segment.doc_count(),
            checksum,
            deleted: Default::default(),
        });
        self.index.cache_segment(Arc::new(segment));
        self.dirty = true;
        Ok(())
    }

    fn publish(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.commit.generation += 1;
        if let Err(e) = self.commit.write(self.index.storage().as_ref()) {
            self.commit.generation -= 1;
            return Err(e);
        }
        self.dirty = false;
        debug!(
            "Committed generation {} ({} live documents)",
            self.commit.generation,
            self.commit.live_docs()
        );
        Ok(())
    }
}

impl LexicalIndexWriter for InvertedIndexWriter {
    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.check_open()?;
        let doc = self.analyze(doc);
        self.buffer.push(doc);
        if self.buffer.len() >= self.config.max_buffered_docs {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn delete_documents(&mut self, key: &str) -> Result<usize> {
        self.check_open()?;
        let before = self.buffer.len();
        self.buffer.retain(|doc| doc.key != key);
        let mut deleted = before - self.buffer.len();

        for i in 0..self.commit.segments.len() {
            let segment = self.index.load_segment(&self.commit.segments[i])?;
            let meta = &mut self.commit.segments[i];
            for &ord in segment.docs_for_key(key) {
                if meta.deleted.insert(ord) {
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            self.dirty = true;
        }
        Ok(deleted)
    }

    fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_buffer()?;
        self.publish()
    }

    fn optimize(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_buffer()?;

        if self.commit.segments.len() <= 1 && !self.commit.has_deletions() {
            return self.publish();
        }

        let old = mem::take(&mut self.commit.segments);
        let mut docs = Vec::new();
        for meta in &old {
            let segment = self.index.load_segment(meta)?;
            docs.extend(
                segment
                    .docs()
                    .iter()
                    .enumerate()
                    .filter(|(ord, _)| !meta.deleted.contains(&(*ord as u32)))
                    .map(|(_, doc)| doc.clone()),
            );
        }

        let merged_docs = docs.len();
        let result = if docs.is_empty() {
            self.dirty = true;
            Ok(())
        } else {
            let name = format!("seg_{:06}", self.commit.next_segment);
            self.write_segment(Segment::new(name, docs))
                .map(|()| self.commit.next_segment += 1)
        };
        if let Err(e) = result.and_then(|()| self.publish()) {
            // Leave the previous commit in place.
            self.commit.segments = old;
            return Err(e);
        }

        info!(
            "Optimized {} segments into one with {} documents",
            old.len(),
            merged_docs
        );
        for meta in old {
            let file = Segment::file_name(&meta.name);
            if let Err(e) = self.index.storage().delete_file(&file) {
                warn!("Failed to delete merged segment file {file}: {e}");
            }
        }
        Ok(())
    }

    fn pending_changes(&self) -> bool {
        self.dirty || !self.buffer.is_empty()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        let committed = self.commit();
        self.closed = true;
        let released = self.index.release_writer(&self.lock_token);
        committed.and(released)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for InvertedIndexWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.pending_changes() {
            warn!("Index writer dropped with uncommitted changes; they are discarded");
        }
        if let Err(e) = self.index.release_writer(&self.lock_token) {
            warn!("Failed to release the write lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PerFieldAnalyzer;
    use crate::lexical::document::FieldOption;
    use crate::storage::Storage;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn memory_index() -> Arc<InvertedIndex> {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        InvertedIndex::open(storage, Arc::new(PerFieldAnalyzer::default())).unwrap()
    }

    fn body_doc(key: &str, body: &str) -> Document {
        Document::new(key).with_field("body", body, FieldOption::text().stored(true).with_term_vectors())
    }

    #[test]
    fn test_commit_publishes_generation() {
        let index = memory_index();
        let mut writer = index.writer(InvertedIndexWriterConfig::default()).unwrap();

        writer.add_document(body_doc("a.1", "quick brown fox")).unwrap();
        assert!(writer.pending_changes());
        assert_eq!(index.committed_generation().unwrap(), 0);

        writer.commit().unwrap();
        assert!(!writer.pending_changes());
        assert_eq!(index.committed_generation().unwrap(), 1);

        // nothing to commit
        writer.commit().unwrap();
        assert_eq!(index.committed_generation().unwrap(), 1);
        writer.close().unwrap();
    }

    #[test]
    fn test_repeated_fields_continue_positions() {
        let index = memory_index();
        let writer = index.writer(InvertedIndexWriterConfig::default()).unwrap();
        let doc = Document::new("a.1")
            .with_field("body", "brown fox", FieldOption::text())
            .with_field("body", "lazy dog", FieldOption::text());
        let analyzed = writer.analyze(doc);
        let body = &analyzed.fields["body"];
        assert_eq!(body.length, 4);
        assert_eq!(body.terms["lazy"], vec![2]);
        assert_eq!(analyzed.fields["id"].terms["a.1"], vec![0]);
        assert_eq!(analyzed.stored, vec![("id".to_string(), "a.1".to_string())]);
    }

    #[test]
    fn test_delete_buffered_and_committed() {
        let index = memory_index();
        let mut writer = index.writer(InvertedIndexWriterConfig::default()).unwrap();

        writer.add_document(body_doc("a.1", "fox")).unwrap();
        writer.commit().unwrap();
        writer.add_document(body_doc("a.1", "fox again")).unwrap();

        assert_eq!(writer.delete_documents("a.1").unwrap(), 2);
        assert_eq!(writer.delete_documents("a.1").unwrap(), 0);
        assert_eq!(writer.delete_documents("missing").unwrap(), 0);
        writer.commit().unwrap();

        assert_eq!(index.open_snapshot().unwrap().num_docs(), 0);
        writer.close().unwrap();
    }

    #[test]
    fn test_optimize_merges_and_drops_deleted() {
        let index = memory_index();
        let config = InvertedIndexWriterConfig { max_buffered_docs: 1 };
        let mut writer = index.writer(config).unwrap();

        for i in 0..4 {
            writer.add_document(body_doc(&format!("a.{i}"), "fox")).unwrap();
        }
        writer.delete_documents("a.2").unwrap();
        writer.commit().unwrap();
        assert_eq!(index.read_commit().unwrap().segments.len(), 4);

        writer.optimize().unwrap();
        let commit = index.read_commit().unwrap();
        assert_eq!(commit.segments.len(), 1);
        assert_eq!(commit.segments[0].doc_count, 3);
        assert!(!commit.has_deletions());
        assert!(!index.storage().file_exists("seg_000000.json"));

        let snapshot = index.open_snapshot().unwrap();
        assert_eq!(snapshot.num_docs(), 3);
        writer.close().unwrap();
    }

    #[test]
    fn test_closed_writer_rejects_calls() {
        let index = memory_index();
        let mut writer = index.writer(InvertedIndexWriterConfig::default()).unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(writer.add_document(body_doc("a.1", "fox")).is_err());
        assert!(writer.close().is_err());
    }
}
