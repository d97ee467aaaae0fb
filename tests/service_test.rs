use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use sift::content::ContentFields;
use sift::lexical::InvertedIndexWriterConfig;
use sift::storage::StorageConfig;
use sift::storage::file::FileStorageConfig;
use sift::{EngineConfig, IndexerConfig, ProviderConfig, RefreshOutcome, SearchService, SiftError};

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        storage: StorageConfig::File(FileStorageConfig::new(dir.path())),
        indexer: IndexerConfig {
            idle_timeout_ms: 50,
            ..IndexerConfig::default()
        },
        // Tests refresh explicitly.
        provider: ProviderConfig {
            refresh_interval_secs: 3600,
        },
        ..EngineConfig::default()
    }
}

fn article(content_id: &str, body: &str) -> ContentFields {
    ContentFields::builder("kb", content_id)
        .title(format!("Article {content_id}"))
        .body(body)
        .build()
        .unwrap()
}

/// Refresh until `query` matches `expected` documents.
fn wait_for_hits(service: &SearchService, query: &str, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        service.refresh();
        if service.guess_hit_count(query).unwrap() == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "'{query}' never matched {expected} documents"
        );
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_phrase_hints() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    service.index_content(article("1", "quick brown fox"))?;
    service.index_content(article("2", "brown fox jumps"))?;
    wait_for_hits(&service, "fox", 2);

    assert_eq!(
        service.suggest("bro"),
        vec!["+brown", "+brown +fox", "+brown +fox +jumps"]
    );
    assert!(service.suggest("bro wn").is_empty());
    assert!(service.suggest("").is_empty());

    service.shutdown()
}

#[test]
fn test_upsert_replaces_and_delete_is_idempotent() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    service.index_content(article("1", "alpha"))?;
    wait_for_hits(&service, "alpha", 1);

    service.index_content(article("1", "beta"))?;
    wait_for_hits(&service, "beta", 1);
    assert_eq!(service.guess_hit_count("alpha")?, 0);
    assert_eq!(service.guess_hit_count("+kb")?, 0);

    let results = service.search("beta", 0, 10)?;
    assert_eq!(results.total_hits, 1);
    assert_eq!(results.hits[0].app_id, "kb");
    assert_eq!(results.hits[0].content_id, "1");

    service.delete_content("kb", "1")?;
    service.delete_content("kb", "1")?;
    service.delete_content("kb", "missing")?;
    wait_for_hits(&service, "beta", 0);
    assert_eq!(service.indexer().stats().failed, 0);

    service.shutdown()
}

#[test]
fn test_dotted_content_ids_stay_distinct() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    let err = ContentFields::builder("kb.v2", "1").body("alpha").build().unwrap_err();
    assert!(matches!(err, SiftError::Validation(_)));
    assert!(matches!(service.delete_content("kb.v2", "1"), Err(SiftError::Validation(_))));

    service.index_content(article("v2.1", "alpha"))?;
    service.index_content(article("v2", "beta"))?;
    wait_for_hits(&service, "alpha beta", 2);

    let results = service.search("alpha", 0, 10)?;
    assert_eq!(results.total_hits, 1);
    assert_eq!(results.hits[0].app_id, "kb");
    assert_eq!(results.hits[0].content_id, "v2.1");

    service.shutdown()
}

#[test]
fn test_search_modes() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    service.index_content(article("1", "fox"))?;
    service.index_content(article("2", "fox fox dog"))?;
    service.index_content(article("3", "dog cat"))?;
    wait_for_hits(&service, "dog", 2);

    let all = service.search("fox", 0, 0)?;
    assert_eq!(all.total_hits, 2);
    assert_eq!(all.hits.len(), 2);
    assert!(all.hits[0].score >= all.hits[1].score);

    let first = service.search("fox", 0, 1)?;
    assert_eq!(first.total_hits, 2);
    assert_eq!(first.hits.len(), 1);
    assert_eq!(first.hits[0], all.hits[0]);

    let second = service.search("fox", 1, 1)?;
    assert_eq!(second.hits.len(), 1);
    assert_eq!(second.hits[0], all.hits[1]);

    assert!(service.search("fox", 5, 10)?.hits.is_empty());

    let unranked = service.search("fox", 7, -1)?;
    assert_eq!(unranked.hits.len(), 2);
    assert!(unranked.hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));

    assert_eq!(service.guess_hit_count("+fox +dog")?, 1);
    assert_eq!(service.guess_hit_count("dog -cat")?, 1);
    assert_eq!(service.guess_hit_count("\"fox dog\"")?, 1);
    assert_eq!(service.guess_hit_count("fo*")?, 2);

    service.shutdown()
}

#[test]
fn test_stored_fields_and_keyword_fields() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    let fields = ContentFields::builder("kb", "7")
        .author("alice")
        .title("Fox facts")
        .body("all about foxes")
        .publication_date("20240131")
        .language("EN")
        .product("sift")
        .version("1.0")
        .extra_data("{\"views\":3}")
        .content_type("article")
        .build()?;
    service.index_content(fields)?;
    wait_for_hits(&service, "facts", 1);

    let hit = service.search("facts", 0, 10)?.hits.remove(0);
    assert_eq!(hit.author.as_deref(), Some("alice"));
    assert_eq!(hit.title.as_deref(), Some("Fox facts"));
    assert_eq!(hit.publication_date.as_deref(), Some("20240131"));
    assert_eq!(hit.language.as_deref(), Some("EN"));
    assert_eq!(hit.product.as_deref(), Some("sift"));
    assert_eq!(hit.version.as_deref(), Some("1.0"));
    assert_eq!(hit.extra_data.as_deref(), Some("{\"views\":3}"));
    assert_eq!(hit.content_type.as_deref(), Some("article"));

    assert_eq!(service.guess_hit_count("language:EN")?, 1);
    assert_eq!(service.guess_hit_count("language:en")?, 0);
    assert_eq!(service.guess_hit_count("appid:kb")?, 1);

    service.shutdown()
}

#[test]
fn test_html_content_is_indexed_as_text() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    let fields = ContentFields::builder("kb", "1")
        .body("<p>Hello&nbsp;<b>world</b></p>")
        .build()?;
    service.index_html_content(fields)?;
    wait_for_hits(&service, "world", 1);

    assert_eq!(service.guess_hit_count("hello")?, 1);
    assert_eq!(service.guess_hit_count("nbsp")?, 0);

    service.shutdown()
}

#[test]
fn test_malformed_query_is_reported() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    let err = service.search("\"unterminated", 0, 10).unwrap_err();
    assert!(matches!(err, SiftError::Query(_)));
    assert!(service.guess_hit_count("title:").is_err());

    service.shutdown()
}

#[test]
fn test_reopen_sees_committed_content() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let service = SearchService::open(config(&dir))?;
        service.index_content(article("1", "persistent fox"))?;
        wait_for_hits(&service, "persistent", 1);
        service.index_content(article("2", "queued fox"))?;
        // Queued jobs are applied and committed on shutdown.
        service.shutdown()?;
    }

    let service = SearchService::open(config(&dir))?;
    assert_eq!(service.guess_hit_count("fox")?, 2);
    service.shutdown()
}

#[test]
fn test_single_writer_and_deferred_refresh() -> sift::Result<()> {
    let dir = TempDir::new().unwrap();
    let service = SearchService::open(config(&dir))?;

    let err = service
        .index()
        .writer(InvertedIndexWriterConfig::default())
        .unwrap_err();
    assert!(matches!(err, SiftError::InvalidOperation(_)));

    service.index_content(article("1", "fox"))?;
    {
        let _optimizing = service.indexer().optimizing_flag().raise();
        assert_eq!(service.refresh(), RefreshOutcome::Deferred);
    }
    wait_for_hits(&service, "fox", 1);
    assert_eq!(service.refresh(), RefreshOutcome::Current);

    service.shutdown()
}
