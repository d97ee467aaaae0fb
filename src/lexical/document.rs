//! Index documents.
//!
//! A [`Document`] is what the writer consumes: a unique key plus a list of
//! named string fields, each with a [`FieldOption`] saying whether it is
//! stored, how it is indexed, and whether term vectors are kept for it.

use serde::{Deserialize, Serialize};

/// Name of the keyword field holding the document key.
pub const KEY_FIELD: &str = "id";

/// How a field's value is turned into terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indexing {
    /// Not searchable.
    No,
    /// The whole value is one term, unchanged.
    Keyword,
    /// The value is run through the field's analyzer.
    Tokenized,
}

/// Per-field storage and indexing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub stored: bool,
    pub indexing: Indexing,
    /// Keep the per-document term position vector (tokenized fields only).
    pub term_vectors: bool,
}

impl FieldOption {
    /// Tokenized, not stored.
    pub fn text() -> Self {
        FieldOption {
            stored: false,
            indexing: Indexing::Tokenized,
            term_vectors: false,
        }
    }

    /// Single-term, not stored.
    pub fn keyword() -> Self {
        FieldOption {
            stored: false,
            indexing: Indexing::Keyword,
            term_vectors: false,
        }
    }

    /// Stored but not searchable.
    pub fn stored_only() -> Self {
        FieldOption {
            stored: true,
            indexing: Indexing::No,
            term_vectors: false,
        }
    }

    pub fn stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.term_vectors = true;
        self
    }
}

impl Default for FieldOption {
    fn default() -> Self {
        FieldOption::text()
    }
}

/// A single named field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub option: FieldOption,
}

/// A keyed document ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    key: String,
    fields: Vec<Field>,
}

impl Document {
    /// Create a document whose key is stored and indexed in [`KEY_FIELD`].
    pub fn new<K: Into<String>>(key: K) -> Self {
        let key = key.into();
        let fields = vec![Field {
            name: KEY_FIELD.to_string(),
            value: key.clone(),
            option: FieldOption::keyword().stored(true),
        }];
        Document { key, fields }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Add a field. Empty values are skipped.
    pub fn add_field<N: Into<String>, V: Into<String>>(
        &mut self,
        name: N,
        value: V,
        option: FieldOption,
    ) -> &mut Self {
        let value = value.into();
        if !value.is_empty() {
            self.fields.push(Field {
                name: name.into(),
                value,
                option,
            });
        }
        self
    }

    pub fn with_field<N: Into<String>, V: Into<String>>(
        mut self,
        name: N,
        value: V,
        option: FieldOption,
    ) -> Self {
        self.add_field(name, value, option);
        self
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_field_is_added() {
        let doc = Document::new("a1.1");
        assert_eq!(doc.key(), "a1.1");
        assert_eq!(doc.get(KEY_FIELD), Some("a1.1"));
        assert!(doc.fields()[0].option.stored);
        assert_eq!(doc.fields()[0].option.indexing, Indexing::Keyword);
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let doc = Document::new("k")
            .with_field("title", "", FieldOption::text())
            .with_field("body", "text", FieldOption::text().with_term_vectors());
        assert_eq!(doc.fields().len(), 2);
        assert!(doc.get("title").is_none());
        assert!(doc.fields()[1].option.term_vectors);
    }
}
