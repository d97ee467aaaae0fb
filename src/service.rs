//! The search service.
//!
//! [`SearchService`] wires the pieces together: it opens the index in the
//! configured storage, hands the index writer to the [`Indexer`] worker and
//! starts the [`SnapshotProvider`]. Writes go through the mutation queue and
//! become searchable once the worker has flushed and the provider has
//! refreshed; reads always run against the published snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::analysis::PerFieldAnalyzer;
use crate::config::EngineConfig;
use crate::content::{
    self, AUTHOR_FIELD, CONTENTTYPE_FIELD, ContentFields, DocumentId, EXTRADATA_FIELD, FieldSet,
    LANGUAGE_FIELD, PRODUCT_FIELD, PUBDATE_FIELD, QUERY_FIELDS, TITLE_FIELD, VERSION_FIELD,
};
use crate::error::Result;
use crate::indexer::{Indexer, OptimizingFlag};
use crate::lexical::query::collector::MaxScoreCollector;
use crate::lexical::{
    InvertedIndex, LexicalIndexWriter, Query, QueryParser, ScoredDoc, Snapshot, StoredDocument,
};
use crate::provider::{RefreshOutcome, SnapshotProvider};
use crate::storage::StorageFactory;
use crate::suggest::PhraseMiner;

/// One search hit with the stored fields of the content.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub app_id: String,
    pub content_id: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub publication_date: Option<String>,
    pub language: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_data: Option<String>,
    pub content_type: Option<String>,
    pub score: f32,
}

impl SearchHit {
    fn new(doc: &StoredDocument, score: f32) -> Self {
        let (app_id, content_id) = match DocumentId::parse(&doc.key) {
            Ok(id) => (id.app_id().to_string(), id.content_id().to_string()),
            Err(e) => {
                warn!("Indexed document has a malformed key: {e}");
                (String::new(), String::new())
            }
        };
        let field = |name: &str| doc.get(name).map(str::to_string);
        SearchHit {
            app_id,
            content_id,
            author: field(AUTHOR_FIELD),
            title: field(TITLE_FIELD),
            publication_date: field(PUBDATE_FIELD),
            language: field(LANGUAGE_FIELD),
            product: field(PRODUCT_FIELD),
            version: field(VERSION_FIELD),
            extra_data: field(EXTRADATA_FIELD),
            content_type: field(CONTENTTYPE_FIELD),
            score,
        }
    }
}

/// Hits of a search and how long it took.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Number of matching documents, not just those in `hits`.
    pub total_hits: usize,
    pub elapsed: Duration,
}

/// A full-text index fed through an asynchronous queue.
#[derive(Debug)]
pub struct SearchService {
    index: Arc<InvertedIndex>,
    parser: QueryParser,
    miner: PhraseMiner,
    indexer: Indexer,
    provider: SnapshotProvider,
}

impl SearchService {
    /// Open the index and start the background workers.
    pub fn open(config: EngineConfig) -> Result<Self> {
        info!("Search service starting");
        let storage = StorageFactory::create(config.storage.clone())?;
        let analyzer = Arc::new(content::analyzer_with(config.analysis.standard_analyzer()));
        let index = InvertedIndex::open(storage, Arc::clone(&analyzer))?;

        let writer = index.writer(config.indexer.writer.clone())?;
        Self::start(index, analyzer, Box::new(writer), config)
    }

    /// Start the service around an already opened index and writer.
    pub fn start(
        index: Arc<InvertedIndex>,
        analyzer: Arc<PerFieldAnalyzer>,
        writer: Box<dyn LexicalIndexWriter>,
        config: EngineConfig,
    ) -> Result<Self> {
        let optimizing = OptimizingFlag::new();
        let indexer = Indexer::start(writer, config.indexer.clone(), optimizing.clone())?;
        let provider =
            SnapshotProvider::start(Arc::clone(&index), optimizing, config.provider.clone())?;

        let parser = QueryParser::new(Arc::clone(&analyzer))
            .with_default_fields(QUERY_FIELDS.iter().map(|f| f.to_string()).collect());
        let miner = PhraseMiner::new(analyzer);

        Ok(SearchService {
            index,
            parser,
            miner,
            indexer,
            provider,
        })
    }

    pub fn index(&self) -> &Arc<InvertedIndex> {
        &self.index
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Queue an upsert. Returns once queued, not once applied.
    pub fn submit_upsert<F: FieldSet + 'static>(&self, id: DocumentId, fields: F) -> Result<()> {
        self.indexer.submit_upsert(id, fields)
    }

    /// Queue a delete. Returns once queued, not once applied.
    pub fn submit_delete(&self, id: DocumentId) -> Result<()> {
        self.indexer.submit_delete(id)
    }

    pub fn index_content(&self, fields: ContentFields) -> Result<()> {
        let id = fields.id().clone();
        self.submit_upsert(id, fields)
    }

    /// Convert `body` and `comments` from HTML to text, then index.
    pub fn index_html_content(&self, mut fields: ContentFields) -> Result<()> {
        fields.convert_html_to_text();
        self.index_content(fields)
    }

    pub fn delete_content(&self, app_id: &str, content_id: &str) -> Result<()> {
        self.submit_delete(DocumentId::new(app_id, content_id)?)
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.provider.snapshot()
    }

    fn parse(&self, query: &str) -> Result<Query> {
        self.parser.parse(query).inspect_err(|e| {
            error!("Failed to parse query '{query}': {e}");
        })
    }

    /// Search the published snapshot.
    ///
    /// With `count >= 0`, hits are ranked and `count` of them are returned
    /// from `start` on; `0` returns all of them. With a negative `count`,
    /// every hit with a positive score is returned in index order, `start` is
    /// ignored, and scores are divided by the highest one when it exceeds 1.
    pub fn search(&self, query: &str, start: usize, count: i64) -> Result<SearchResults> {
        let started = Instant::now();
        let snapshot = self.snapshot()?;
        let query = self.parse(query)?;

        let to_hits = |docs: Vec<ScoredDoc>| -> Vec<SearchHit> {
            docs.into_iter()
                .filter_map(|hit| {
                    snapshot
                        .doc(hit.address)
                        .map(|doc| SearchHit::new(&doc, hit.score))
                })
                .collect()
        };

        let (hits, total_hits) = if count >= 0 {
            let wanted = match usize::try_from(count) {
                Ok(0) | Err(_) => usize::MAX,
                Ok(n) => n,
            };
            let top = snapshot.search(&query, start.saturating_add(wanted))?;
            let page: Vec<ScoredDoc> = top.hits.into_iter().skip(start).take(wanted).collect();
            (to_hits(page), top.total_hits)
        } else {
            let mut collector = MaxScoreCollector::default();
            snapshot.search_with_collector(&query, &mut collector)?;
            let hits = to_hits(collector.into_normalized());
            let total = hits.len();
            (hits, total)
        };

        Ok(SearchResults {
            hits,
            total_hits,
            elapsed: started.elapsed(),
        })
    }

    /// Number of documents matching `query`.
    pub fn guess_hit_count(&self, query: &str) -> Result<usize> {
        let snapshot = self.snapshot()?;
        let query = self.parse(query)?;
        snapshot.count(&query)
    }

    /// Query hints for the word being typed. Failures are logged and yield
    /// no hints.
    pub fn suggest(&self, term: &str) -> Vec<String> {
        let hints = self
            .snapshot()
            .and_then(|snapshot| self.miner.suggest(&snapshot, term));
        match hints {
            Ok(hints) => hints.iter().map(ToString::to_string).collect(),
            Err(e) => {
                error!("Failed to build hints for '{term}': {e}");
                Vec::new()
            }
        }
    }

    /// Refresh the published snapshot now instead of waiting for the next
    /// cycle.
    pub fn refresh(&self) -> RefreshOutcome {
        self.provider.refresh()
    }

    /// Drain the queue, close the writer and stop the background threads.
    pub fn shutdown(&self) -> Result<()> {
        info!("Search service shutting down");
        let result = self.indexer.shutdown();
        self.provider.shutdown();
        result
    }
}
