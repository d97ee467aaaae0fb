//! Content documents.
//!
//! Maps the content model of the site (articles, code samples, comments)
//! onto index documents. Every piece of content is identified by a
//! [`DocumentId`], the pair of the owning application's id and the
//! content's id within that application; the index key is `app.content`.
//!
//! | field | stored | indexed | term vectors |
//! |---|---|---|---|
//! | `id` | yes | keyword | |
//! | `author` | yes | text | |
//! | `title` | yes | text | positions |
//! | `pubdate`, `language`, `product`, `version` | yes | keyword | |
//! | `extradata`, `contenttype` | yes | no | |
//! | `appid`, `category` | no | keyword | |
//! | `summary`, `comments`, `tags`, `workaround`, `source` | no | text | |
//! | `body` | no | text | positions |
//! | `{lang}.comments`, `{lang}.source`, ... | no | text | |

pub mod html;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::analysis::{KeywordAnalyzer, PerFieldAnalyzer, StandardAnalyzer};
use crate::error::{Result, SiftError};
use crate::lexical::{Document, FieldOption, KEY_FIELD};

pub const APPID_FIELD: &str = "appid";
pub const ID_FIELD: &str = KEY_FIELD;
pub const AUTHOR_FIELD: &str = "author";
pub const TITLE_FIELD: &str = "title";
pub const SUMMARY_FIELD: &str = "summary";
pub const BODY_FIELD: &str = "body";
pub const PUBDATE_FIELD: &str = "pubdate";
pub const LANGUAGE_FIELD: &str = "language";
pub const COMMENTS_FIELD: &str = "comments";
pub const PRODUCT_FIELD: &str = "product";
pub const VERSION_FIELD: &str = "version";
pub const TAGS_FIELD: &str = "tags";
pub const CATEGORY_FIELD: &str = "category";
pub const EXTRADATA_FIELD: &str = "extradata";
pub const CONTENTTYPE_FIELD: &str = "contenttype";
pub const WORKAROUND_FIELD: &str = "workaround";
pub const SOURCE_FIELD: &str = "source";

/// Fields searched when a query clause names no field.
pub const QUERY_FIELDS: [&str; 3] = [TITLE_FIELD, SUMMARY_FIELD, BODY_FIELD];

/// Fields indexed as a single unanalyzed term.
pub const KEYWORD_FIELDS: [&str; 7] = [
    ID_FIELD,
    APPID_FIELD,
    PUBDATE_FIELD,
    LANGUAGE_FIELD,
    PRODUCT_FIELD,
    VERSION_FIELD,
    CATEGORY_FIELD,
];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{8}([0-9]{6})?$").unwrap());

static SNIPPET_LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap());

/// The analyzer content documents are indexed and queried with.
pub fn analyzer() -> PerFieldAnalyzer {
    analyzer_with(StandardAnalyzer::new())
}

/// Like [`analyzer`], with `text` for the tokenized fields.
pub fn analyzer_with(text: StandardAnalyzer) -> PerFieldAnalyzer {
    let keyword = Arc::new(KeywordAnalyzer);
    let mut analyzer = PerFieldAnalyzer::new(Arc::new(text));
    for field in KEYWORD_FIELDS {
        analyzer.add_analyzer(field, keyword.clone());
    }
    analyzer
}

/// Identity of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    app_id: String,
    content_id: String,
}

impl DocumentId {
    /// Both parts must be non-empty, and the app id must not contain `.`
    /// so that the key splits back into the same pair.
    pub fn new<A: Into<String>, C: Into<String>>(app_id: A, content_id: C) -> Result<Self> {
        let app_id = app_id.into();
        let content_id = content_id.into();
        if app_id.is_empty() || content_id.is_empty() {
            return Err(SiftError::validation(format!(
                "app id or content id is empty, cannot index invalid id '{app_id}.{content_id}'"
            )));
        }
        if app_id.contains('.') {
            return Err(SiftError::validation(format!(
                "app id '{app_id}' contains '.', cannot index invalid id '{app_id}.{content_id}'"
            )));
        }
        Ok(DocumentId { app_id, content_id })
    }

    /// Parse an index key, splitting on the first `.`.
    pub fn parse(key: &str) -> Result<Self> {
        match key.split_once('.') {
            Some((app_id, content_id)) => DocumentId::new(app_id, content_id),
            None => Err(SiftError::validation(format!("malformed document key '{key}'"))),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// The index key, `app_id.content_id`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.app_id, self.content_id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_id, self.content_id)
    }
}

/// Something that can be indexed under a [`DocumentId`].
pub trait FieldSet: Send + fmt::Debug {
    fn document_id(&self) -> &DocumentId;

    fn to_document(&self) -> Result<Document>;
}

/// A source code sample attached to content.
///
/// Samples of the same language are merged and indexed under
/// `{language}.comments`, `{language}.source`, `{language}.sourceWithoutComments`,
/// `{language}.sourceWithoutStrings` and `{language}.strings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCodeSnippet {
    pub language: String,
    pub comments: String,
    pub source: String,
    pub source_without_comments: String,
    pub source_without_strings: String,
    pub strings: String,
}

impl SourceCodeSnippet {
    pub fn new<S: Into<String>>(language: S) -> Self {
        SourceCodeSnippet {
            language: language.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(SiftError::validation("snippet language cannot be empty"));
        }
        if !SNIPPET_LANGUAGE_RE.is_match(&self.language) {
            return Err(SiftError::validation(format!(
                "snippet language '{}' can only contain letters and numbers",
                self.language
            )));
        }
        Ok(())
    }

    fn append(&mut self, other: &SourceCodeSnippet) {
        fn join(into: &mut String, value: &str) {
            if value.is_empty() {
                return;
            }
            if !into.is_empty() {
                into.push(' ');
            }
            into.push_str(value);
        }
        join(&mut self.comments, &other.comments);
        join(&mut self.source, &other.source);
        join(&mut self.source_without_comments, &other.source_without_comments);
        join(&mut self.source_without_strings, &other.source_without_strings);
        join(&mut self.strings, &other.strings);
    }
}

/// A validated piece of content ready for indexing.
///
/// Built through [`ContentFields::builder`]; empty fields are not indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFields {
    id: DocumentId,
    author: String,
    title: String,
    summary: String,
    body: String,
    publication_date: String,
    language: String,
    comments: String,
    product: String,
    version: String,
    tags: String,
    category: String,
    extra_data: String,
    content_type: String,
    workaround: String,
    source: String,
    snippets: Vec<SourceCodeSnippet>,
}

impl ContentFields {
    pub fn builder<A: Into<String>, C: Into<String>>(app_id: A, content_id: C) -> ContentFieldsBuilder {
        ContentFieldsBuilder {
            app_id: app_id.into(),
            content_id: content_id.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn publication_date(&self) -> &str {
        &self.publication_date
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn comments(&self) -> &str {
        &self.comments
    }

    pub fn snippets(&self) -> &[SourceCodeSnippet] {
        &self.snippets
    }

    /// Replace the HTML markup in `body` and `comments` by plain text.
    pub fn convert_html_to_text(&mut self) {
        self.body = html::html_to_text(&self.body);
        self.comments = html::html_to_text(&self.comments);
    }

    /// Snippets merged by language, in language order.
    fn merged_snippets(&self) -> BTreeMap<&str, SourceCodeSnippet> {
        let mut merged: BTreeMap<&str, SourceCodeSnippet> = BTreeMap::new();
        for snippet in &self.snippets {
            merged
                .entry(snippet.language.as_str())
                .or_insert_with(|| SourceCodeSnippet::new(snippet.language.clone()))
                .append(snippet);
        }
        merged
    }
}

impl FieldSet for ContentFields {
    fn document_id(&self) -> &DocumentId {
        &self.id
    }

    fn to_document(&self) -> Result<Document> {
        let stored_text = FieldOption::text().stored(true);
        let stored_keyword = FieldOption::keyword().stored(true);

        let mut doc = Document::new(self.id.key());
        doc.add_field(AUTHOR_FIELD, self.author.as_str(), stored_text)
            .add_field(TITLE_FIELD, self.title.as_str(), stored_text.with_term_vectors())
            .add_field(PUBDATE_FIELD, self.publication_date.as_str(), stored_keyword)
            .add_field(LANGUAGE_FIELD, self.language.as_str(), stored_keyword)
            .add_field(PRODUCT_FIELD, self.product.as_str(), stored_keyword)
            .add_field(VERSION_FIELD, self.version.as_str(), stored_keyword)
            .add_field(EXTRADATA_FIELD, self.extra_data.as_str(), FieldOption::stored_only())
            .add_field(CONTENTTYPE_FIELD, self.content_type.as_str(), FieldOption::stored_only())
            .add_field(APPID_FIELD, self.id.app_id(), FieldOption::keyword())
            .add_field(SUMMARY_FIELD, self.summary.as_str(), FieldOption::text())
            .add_field(BODY_FIELD, self.body.as_str(), FieldOption::text().with_term_vectors())
            .add_field(COMMENTS_FIELD, self.comments.as_str(), FieldOption::text())
            .add_field(TAGS_FIELD, self.tags.as_str(), FieldOption::text())
            .add_field(CATEGORY_FIELD, self.category.as_str(), FieldOption::keyword())
            .add_field(WORKAROUND_FIELD, self.workaround.as_str(), FieldOption::text())
            .add_field(SOURCE_FIELD, self.source.as_str(), FieldOption::text());

        for (language, snippet) in self.merged_snippets() {
            doc.add_field(format!("{language}.comments"), snippet.comments, FieldOption::text())
                .add_field(format!("{language}.source"), snippet.source, FieldOption::text())
                .add_field(
                    format!("{language}.sourceWithoutComments"),
                    snippet.source_without_comments,
                    FieldOption::text(),
                )
                .add_field(
                    format!("{language}.sourceWithoutStrings"),
                    snippet.source_without_strings,
                    FieldOption::text(),
                )
                .add_field(format!("{language}.strings"), snippet.strings, FieldOption::text());
        }

        Ok(doc)
    }
}

/// Builder for [`ContentFields`].
#[derive(Debug, Clone, Default)]
pub struct ContentFieldsBuilder {
    app_id: String,
    content_id: String,
    author: String,
    title: String,
    summary: String,
    body: String,
    publication_date: String,
    language: String,
    comments: String,
    product: String,
    version: String,
    tags: String,
    category: String,
    extra_data: String,
    content_type: String,
    workaround: String,
    source: String,
    snippets: Vec<SourceCodeSnippet>,
    html: bool,
}

macro_rules! setters {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name<S: Into<String>>(mut self, value: S) -> Self {
                self.$name = value.into();
                self
            }
        )*
    };
}

impl ContentFieldsBuilder {
    setters!(
        author,
        title,
        summary,
        body,
        language,
        comments,
        product,
        version,
        tags,
        category,
        extra_data,
        content_type,
        workaround,
        source,
    );

    /// Publication date as `yyyymmdd` or `yyyymmddhhmmss`.
    pub fn publication_date<S: Into<String>>(mut self, value: S) -> Self {
        self.publication_date = value.into();
        self
    }

    pub fn snippet(mut self, snippet: SourceCodeSnippet) -> Self {
        self.snippets.push(snippet);
        self
    }

    /// Treat `body` and `comments` as HTML.
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    pub fn build(self) -> Result<ContentFields> {
        let id = DocumentId::new(self.app_id, self.content_id)?;
        validate_date(&self.publication_date)?;
        for snippet in &self.snippets {
            snippet.validate()?;
        }

        let mut fields = ContentFields {
            id,
            author: self.author,
            title: self.title,
            summary: self.summary,
            body: self.body,
            publication_date: self.publication_date,
            language: self.language,
            comments: self.comments,
            product: self.product,
            version: self.version,
            tags: self.tags,
            category: self.category,
            extra_data: self.extra_data,
            content_type: self.content_type,
            workaround: self.workaround,
            source: self.source,
            snippets: self.snippets,
        };
        if self.html {
            fields.convert_html_to_text();
        }
        Ok(fields)
    }
}

fn validate_date(date: &str) -> Result<()> {
    if date.is_empty() {
        return Ok(());
    }
    let invalid = || {
        SiftError::validation(format!(
            "date format '{date}' incorrect, required format is yyyymmdd[hhmmss]"
        ))
    };
    if !DATE_RE.is_match(date) {
        return Err(invalid());
    }
    let valid = if date.len() == 8 {
        NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
    } else {
        NaiveDateTime::parse_from_str(date, "%Y%m%d%H%M%S").is_ok()
    };
    if valid { Ok(()) } else { Err(invalid()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::Indexing;

    #[test]
    fn test_document_id() {
        let id = DocumentId::new("kb", "42").unwrap();
        assert_eq!(id.key(), "kb.42");
        assert_eq!(id.to_string(), "kb.42");

        assert!(matches!(DocumentId::new("", "42"), Err(SiftError::Validation(_))));
        assert!(matches!(DocumentId::new("kb", ""), Err(SiftError::Validation(_))));
    }

    #[test]
    fn test_document_id_parse_splits_on_first_dot() {
        let id = DocumentId::parse("kb.release.notes").unwrap();
        assert_eq!(id.app_id(), "kb");
        assert_eq!(id.content_id(), "release.notes");
        assert!(DocumentId::parse("nodot").is_err());
        assert!(DocumentId::parse(".42").is_err());
    }

    #[test]
    fn test_document_id_key_is_reversible() {
        assert!(matches!(DocumentId::new("a.b", "c"), Err(SiftError::Validation(_))));
        assert!(ContentFields::builder("a.b", "c").build().is_err());

        let id = DocumentId::new("a", "b.c").unwrap();
        assert_eq!(id.key(), "a.b.c");
        assert_eq!(DocumentId::parse(&id.key()).unwrap(), id);
    }

    #[test]
    fn test_date_validation() {
        assert!(ContentFields::builder("a", "1").publication_date("20070315").build().is_ok());
        assert!(ContentFields::builder("a", "1").publication_date("20070315235959").build().is_ok());
        assert!(ContentFields::builder("a", "1").publication_date("").build().is_ok());
        for bad in ["2007-03-15", "200703", "20071315", "20070230", "20070315246000"] {
            let result = ContentFields::builder("a", "1").publication_date(bad).build();
            assert!(matches!(result, Err(SiftError::Validation(_))), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_snippet_validation() {
        let ok = ContentFields::builder("a", "1").snippet(SourceCodeSnippet::new("Delphi2007")).build();
        assert!(ok.is_ok());
        for bad in ["", "  ", "c++", "c#"] {
            let result = ContentFields::builder("a", "1").snippet(SourceCodeSnippet::new(bad)).build();
            assert!(result.is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_html_conversion() {
        let fields = ContentFields::builder("a", "1")
            .title("<b>kept</b>")
            .body("<p>Hello&nbsp;<i>world</i></p>")
            .comments("a &amp; b")
            .html(true)
            .build()
            .unwrap();
        assert_eq!(fields.body(), "Hello world");
        assert_eq!(fields.comments(), "a   b");
        assert_eq!(fields.title(), "<b>kept</b>");
    }

    #[test]
    fn test_field_mapping() {
        let fields = ContentFields::builder("kb", "7")
            .title("Quick Brown Fox")
            .body("jumps over")
            .language("EN")
            .extra_data("{}")
            .build()
            .unwrap();
        let doc = fields.to_document().unwrap();

        assert_eq!(doc.key(), "kb.7");
        assert_eq!(doc.get(APPID_FIELD), Some("kb"));
        assert!(doc.get(SUMMARY_FIELD).is_none());

        let option = |name: &str| doc.fields().iter().find(|f| f.name == name).unwrap().option;
        assert!(option(TITLE_FIELD).stored && option(TITLE_FIELD).term_vectors);
        assert!(!option(BODY_FIELD).stored && option(BODY_FIELD).term_vectors);
        assert_eq!(option(LANGUAGE_FIELD).indexing, Indexing::Keyword);
        assert_eq!(option(EXTRADATA_FIELD).indexing, Indexing::No);
    }

    #[test]
    fn test_snippets_merge_by_language() {
        let mut first = SourceCodeSnippet::new("delphi");
        first.source = "begin end".to_string();
        first.comments = "first".to_string();
        let mut second = SourceCodeSnippet::new("delphi");
        second.source = "procedure".to_string();
        let mut other = SourceCodeSnippet::new("cpp");
        other.strings = "hello".to_string();

        let doc = ContentFields::builder("a", "1")
            .snippet(first)
            .snippet(second)
            .snippet(other)
            .build()
            .unwrap()
            .to_document()
            .unwrap();

        assert_eq!(doc.get("delphi.source"), Some("begin end procedure"));
        assert_eq!(doc.get("delphi.comments"), Some("first"));
        assert_eq!(doc.get("cpp.strings"), Some("hello"));
        assert!(doc.get("cpp.source").is_none());
    }

    #[test]
    fn test_keyword_fields_use_keyword_analyzer() {
        let analyzer = analyzer();
        assert_eq!(analyzer.analyzer_for(LANGUAGE_FIELD).name(), "keyword");
        assert_eq!(analyzer.analyzer_for(BODY_FIELD).name(), "standard");
    }
}
