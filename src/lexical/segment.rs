//! Immutable index segments.
//!
//! A segment is a batch of analyzed documents written once and never
//! modified. On disk it is a JSON file holding the documents' stored values
//! and per-field term position maps; the commit point records its CRC32 so
//! corruption is detected on load. Postings and the key lookup table are
//! derived in memory when the segment is loaded.

use std::collections::BTreeMap;
use std::ops::Bound;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

/// On-disk format version of segment files.
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Terms of one field of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedField {
    /// Number of tokens in the field.
    pub length: u32,
    /// Whether the term position vector is exposed to readers.
    pub term_vectors: bool,
    /// Term to ascending positions.
    pub terms: BTreeMap<String, Vec<u32>>,
}

/// One analyzed document inside a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDocument {
    pub key: String,
    /// Stored field values in insertion order.
    pub stored: Vec<(String, String)>,
    pub fields: BTreeMap<String, IndexedField>,
}

/// A document's entry in a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Ordinal of the document inside the segment.
    pub doc: u32,
    pub freq: u32,
}

#[derive(Serialize)]
struct SegmentFileRef<'a> {
    version: u32,
    name: &'a str,
    docs: &'a [SegmentDocument],
}

#[derive(Deserialize)]
struct SegmentFile {
    version: u32,
    name: String,
    docs: Vec<SegmentDocument>,
}

/// A loaded segment with its derived postings.
#[derive(Debug)]
pub struct Segment {
    name: String,
    docs: Vec<SegmentDocument>,
    /// field -> term -> postings in ascending doc order
    postings: AHashMap<String, BTreeMap<String, Vec<Posting>>>,
    keys: AHashMap<String, Vec<u32>>,
}

impl Segment {
    pub fn new<S: Into<String>>(name: S, docs: Vec<SegmentDocument>) -> Self {
        let mut postings: AHashMap<String, BTreeMap<String, Vec<Posting>>> = AHashMap::new();
        let mut keys: AHashMap<String, Vec<u32>> = AHashMap::new();

        for (ord, doc) in docs.iter().enumerate() {
            let ord = ord as u32;
            keys.entry(doc.key.clone()).or_default().push(ord);
            for (field_name, field) in &doc.fields {
                let field_postings = postings.entry(field_name.clone()).or_default();
                for (term, positions) in &field.terms {
                    field_postings.entry(term.clone()).or_default().push(Posting {
                        doc: ord,
                        freq: positions.len() as u32,
                    });
                }
            }
        }

        Segment {
            name: name.into(),
            docs,
            postings,
            keys,
        }
    }

    /// File name of a segment in storage.
    pub fn file_name(name: &str) -> String {
        format!("{name}.json")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn docs(&self) -> &[SegmentDocument] {
        &self.docs
    }

    pub fn doc(&self, ord: u32) -> Option<&SegmentDocument> {
        self.docs.get(ord as usize)
    }

    /// Ordinals of every document stored under `key`.
    pub fn docs_for_key(&self, key: &str) -> &[u32] {
        self.keys.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Terms of `field` starting with `prefix`, in term order.
    pub fn terms_with_prefix<'a>(
        &'a self,
        field: &str,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<Posting>)> + 'a {
        self.postings
            .get(field)
            .into_iter()
            .flat_map(move |terms| {
                terms.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            })
            .take_while(move |(term, _)| term.starts_with(prefix))
    }

    /// Serialize to the on-disk format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let file = SegmentFileRef {
            version: SEGMENT_FORMAT_VERSION,
            name: &self.name,
            docs: &self.docs,
        };
        Ok(serde_json::to_vec(&file)?)
    }

    /// Parse a segment file, verifying its checksum.
    pub fn decode(bytes: &[u8], expected_checksum: u32) -> Result<Self> {
        let checksum = crc32fast::hash(bytes);
        if checksum != expected_checksum {
            return Err(SiftError::index(format!(
                "segment checksum mismatch: expected {expected_checksum:08x}, got {checksum:08x}"
            )));
        }
        let file: SegmentFile = serde_json::from_slice(bytes)?;
        if file.version > SEGMENT_FORMAT_VERSION {
            return Err(SiftError::index(format!(
                "segment {} has unsupported format version {}",
                file.name, file.version
            )));
        }
        Ok(Segment::new(file.name, file.docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str, body: &[(&str, &[u32])]) -> SegmentDocument {
        let mut terms = BTreeMap::new();
        let mut length = 0;
        for (term, positions) in body {
            length += positions.len() as u32;
            terms.insert(term.to_string(), positions.to_vec());
        }
        let mut fields = BTreeMap::new();
        fields.insert(
            "body".to_string(),
            IndexedField {
                length,
                term_vectors: true,
                terms,
            },
        );
        SegmentDocument {
            key: key.to_string(),
            stored: vec![("id".to_string(), key.to_string())],
            fields,
        }
    }

    #[test]
    fn test_postings_and_keys() {
        let segment = Segment::new(
            "seg_000000",
            vec![
                doc("a.1", &[("brown", &[1]), ("fox", &[2])]),
                doc("a.2", &[("brown", &[0, 3]), ("bread", &[1])]),
            ],
        );

        let brown = segment.postings("body", "brown");
        assert_eq!(brown, &[Posting { doc: 0, freq: 1 }, Posting { doc: 1, freq: 2 }]);
        assert_eq!(segment.docs_for_key("a.2"), &[1]);
        assert!(segment.docs_for_key("a.3").is_empty());
        assert!(segment.postings("title", "brown").is_empty());
    }

    #[test]
    fn test_terms_with_prefix_in_order() {
        let segment = Segment::new(
            "seg_000000",
            vec![doc("a.1", &[("brown", &[0]), ("bread", &[1]), ("fox", &[2]), ("br", &[3])])],
        );
        let terms: Vec<&str> = segment
            .terms_with_prefix("body", "br")
            .map(|(t, _)| t.as_str())
            .collect();
        assert_eq!(terms, vec!["br", "bread", "brown"]);

        assert_eq!(segment.terms_with_prefix("body", "fox").count(), 1);
        assert_eq!(segment.terms_with_prefix("body", "zz").count(), 0);
        assert_eq!(segment.terms_with_prefix("title", "br").count(), 0);
    }

    #[test]
    fn test_checksum_is_verified() {
        let segment = Segment::new("seg_000001", vec![doc("a.1", &[("fox", &[0])])]);
        let bytes = segment.encode().unwrap();
        let checksum = crc32fast::hash(&bytes);

        let decoded = Segment::decode(&bytes, checksum).unwrap();
        assert_eq!(decoded.name(), "seg_000001");
        assert_eq!(decoded.postings("body", "fox").len(), 1);

        assert!(Segment::decode(&bytes, checksum ^ 1).is_err());
    }
}
