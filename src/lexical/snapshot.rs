//! Point-in-time readers.
//!
//! A [`Snapshot`] pins the segments and deletions of one commit point. It is
//! immutable: later commits never change what it returns. Snapshots are
//! shared as `Arc<Snapshot>`; the last holder to drop one releases it.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;

use crate::error::Result;
use crate::lexical::index::InvertedIndex;
use crate::lexical::query::Query;
use crate::lexical::query::collector::{Collector, CountCollector, TopDocsCollector};
use crate::lexical::segment::{IndexedField, Segment};

/// Address of a document inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocAddress {
    /// Index of the segment within the snapshot.
    pub segment: u32,
    /// Ordinal of the document within the segment.
    pub doc: u32,
}

impl DocAddress {
    pub fn new(segment: u32, doc: u32) -> Self {
        DocAddress { segment, doc }
    }
}

/// A hit and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub address: DocAddress,
    pub score: f32,
}

/// Ranked hits of a query.
#[derive(Debug, Clone, Default)]
pub struct TopDocs {
    /// Number of matching documents, including those not in `hits`.
    pub total_hits: usize,
    pub hits: Vec<ScoredDoc>,
}

/// Stored field values of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub fields: Vec<(String, String)>,
}

impl StoredDocument {
    /// First stored value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every stored value of the named field.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// The term position vector of one field of one document.
#[derive(Debug, Clone, Copy)]
pub struct TermVector<'a> {
    field: &'a IndexedField,
}

impl<'a> TermVector<'a> {
    /// Terms in term order with their ascending positions.
    pub fn terms(&self) -> impl Iterator<Item = (&'a str, &'a [u32])> + 'a {
        self.field
            .terms
            .iter()
            .map(|(term, positions)| (term.as_str(), positions.as_slice()))
    }

    pub fn positions(&self, term: &str) -> Option<&'a [u32]> {
        self.field.terms.get(term).map(Vec::as_slice)
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.field.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field.terms.is_empty()
    }
}

/// A segment pinned by a snapshot with its deletions at that commit.
#[derive(Debug)]
pub(crate) struct SnapshotSegment {
    segment: Arc<Segment>,
    deleted: BTreeSet<u32>,
}

impl SnapshotSegment {
    pub(crate) fn new(segment: Arc<Segment>, deleted: BTreeSet<u32>) -> Self {
        SnapshotSegment { segment, deleted }
    }

    fn is_live(&self, doc: u32) -> bool {
        doc < self.segment.doc_count() && !self.deleted.contains(&doc)
    }

    fn live_count(&self) -> u64 {
        self.segment.doc_count() as u64 - self.deleted.len() as u64
    }
}

/// An immutable view of one committed generation of the index.
#[derive(Debug)]
pub struct Snapshot {
    index: Arc<InvertedIndex>,
    generation: u64,
    segments: Vec<SnapshotSegment>,
    num_docs: u64,
}

impl Snapshot {
    pub(crate) fn new(index: Arc<InvertedIndex>, generation: u64, segments: Vec<SnapshotSegment>) -> Self {
        let num_docs = segments.iter().map(SnapshotSegment::live_count).sum();
        debug!("Opened snapshot of generation {generation} with {num_docs} documents");
        Snapshot {
            index,
            generation,
            segments,
            num_docs,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    /// Whether no commit has been published since this snapshot was opened.
    pub fn is_current(&self) -> Result<bool> {
        Ok(self.index.committed_generation()? == self.generation)
    }

    fn live_segment(&self, address: DocAddress) -> Option<&SnapshotSegment> {
        self.segments
            .get(address.segment as usize)
            .filter(|s| s.is_live(address.doc))
    }

    /// Stored fields of a live document.
    pub fn doc(&self, address: DocAddress) -> Option<StoredDocument> {
        let doc = self.live_segment(address)?.segment.doc(address.doc)?;
        Some(StoredDocument {
            key: doc.key.clone(),
            fields: doc.stored.clone(),
        })
    }

    /// Term position vector of `field`, if the field keeps term vectors.
    pub fn term_vector(&self, address: DocAddress, field: &str) -> Option<TermVector<'_>> {
        let doc = self.live_segment(address)?.segment.doc(address.doc)?;
        doc.fields
            .get(field)
            .filter(|f| f.term_vectors)
            .map(|field| TermVector { field })
    }

    /// Number of live documents containing the term.
    pub fn doc_freq(&self, field: &str, term: &str) -> u64 {
        self.segments
            .iter()
            .map(|s| {
                s.segment
                    .postings(field, term)
                    .iter()
                    .filter(|p| s.is_live(p.doc))
                    .count() as u64
            })
            .sum()
    }

    /// Inverse document frequency of a term.
    pub fn idf(&self, field: &str, term: &str) -> f32 {
        let num_docs = self.num_docs.max(1) as f64;
        let doc_freq = self.doc_freq(field, term) as f64;
        (1.0 + (num_docs / (doc_freq + 1.0)).ln()) as f32
    }

    /// Terms of `field` starting with `prefix` that occur in a live document,
    /// in term order.
    pub fn terms_with_prefix(&self, field: &str, prefix: &str) -> Vec<String> {
        let mut terms = BTreeSet::new();
        for s in &self.segments {
            for (term, postings) in s.segment.terms_with_prefix(field, prefix) {
                if postings.iter().any(|p| s.is_live(p.doc)) {
                    terms.insert(term.clone());
                }
            }
        }
        terms.into_iter().collect()
    }

    /// Run a query, returning the best `limit` hits by descending score.
    pub fn search(&self, query: &Query, limit: usize) -> Result<TopDocs> {
        let mut collector = TopDocsCollector::new(limit);
        self.search_with_collector(query, &mut collector)?;
        Ok(collector.into_top_docs())
    }

    /// Run a query, feeding every live hit to `collector` in index order.
    pub fn search_with_collector<C: Collector + ?Sized>(
        &self,
        query: &Query,
        collector: &mut C,
    ) -> Result<()> {
        let query = query.rewrite(self)?;
        for (ord, s) in self.segments.iter().enumerate() {
            let mut hits: Vec<(u32, f32)> = query
                .score_segment(self, &s.segment)
                .into_iter()
                .filter(|(doc, _)| s.is_live(*doc))
                .collect();
            hits.sort_unstable_by_key(|(doc, _)| *doc);
            for (doc, score) in hits {
                collector.collect(DocAddress::new(ord as u32, doc), score);
            }
        }
        Ok(())
    }

    /// Number of live documents matching a query.
    pub fn count(&self, query: &Query) -> Result<usize> {
        let mut collector = CountCollector::default();
        self.search_with_collector(query, &mut collector)?;
        Ok(collector.count())
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        debug!("Released snapshot of generation {}", self.generation);
    }
}
