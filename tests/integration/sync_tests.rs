//! Engine scenarios over the in-process page source

use crate::common::{
    at, engine, image_attachment, page, test_config, CancellingStore, EditingStore, FakeSource,
    RejectingStore,
};
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wiki_sync::output::ResultStatus;
use wiki_sync::state::CancellationFlag;
use wiki_sync::storage::{
    DocumentStore, MemoryDocumentStore, MemoryObjectStore, MemoryParameterStore, ObjectStore,
    SqliteStorage,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE: &str = "https://wiki.example.com";

fn three_pages() -> Vec<wiki_sync::Page> {
    vec![
        page("ENG", "A", 1, at(3), "<h1>Alpha</h1><p>first</p>"),
        page("ENG", "B", 2, at(1), "<p>beta &amp; more</p>"),
        page("ENG", "C", 1, at(2), "<ul><li>gamma</li></ul>"),
    ]
}

#[tokio::test]
async fn test_first_run_ingests_everything() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    let documents = Arc::new(MemoryDocumentStore::new());
    let parameters = Arc::new(MemoryParameterStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        parameters,
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    let eng = &result.collections[0];
    assert!(eng.is_first_crawl);
    assert_eq!(eng.pages_found, 3);
    assert_eq!(eng.pages_processed, 3);
    assert_eq!(eng.documents_ingested, 3);
    assert_eq!(documents.ids(), vec!["src-A", "src-B", "src-C"]);

    let a = documents.get("src-A").unwrap();
    assert_eq!(a.body, "# Alpha\n\nfirst");
    assert_eq!(a.metadata.collection_key, "ENG");
    assert_eq!(
        a.metadata.url.as_deref(),
        Some("https://wiki.example.com/wiki/spaces/ENG/pages/A")
    );
    assert_eq!(documents.get("src-B").unwrap().body, "beta & more");

    // Final checkpoint is the run start time
    let checkpoint = engine.tracker().get_checkpoint("ENG").await.unwrap();
    assert_eq!(checkpoint, Some(eng.current_crawl));
}

#[tokio::test]
async fn test_rerun_without_changes_is_idempotent() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    let documents = Arc::new(MemoryDocumentStore::new());
    let parameters = Arc::new(MemoryParameterStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        parameters,
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );
    let collections = vec!["ENG".to_string()];

    engine.run(&collections).await;
    let first: Vec<_> = documents
        .ids()
        .iter()
        .map(|id| documents.get(id).unwrap())
        .collect();

    // Incremental rerun: nothing changed since the checkpoint
    let second = engine.run(&collections).await;
    assert_eq!(second.collections[0].pages_changed, 0);
    assert!(!second.collections[0].is_first_crawl);

    // Forced full rerun converges on the same documents
    engine.reset(&collections).await.unwrap();
    let third = engine.run(&collections).await;
    assert_eq!(third.collections[0].documents_ingested, 3);

    let again: Vec<_> = documents
        .ids()
        .iter()
        .map(|id| documents.get(id).unwrap())
        .collect();
    assert_eq!(first, again);
    assert_eq!(documents.len(), 3);
}

#[tokio::test]
async fn test_edited_page_resyncs_under_same_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/P1/diagram.png"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
        )
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), &["ENG"], "");
    let diagram = r#"<p>Overview</p><ac:image><ri:attachment ri:filename="diagram.png" /></ac:image>"#;
    let source = Arc::new(FakeSource::new(vec![
        page("ENG", "P1", 1, at(1), diagram),
        page("ENG", "P2", 4, at(2), "<p>unrelated</p>"),
    ]));
    source.set_attachments("P1", vec![image_attachment("P1", "att9", "diagram.png")]);

    let documents = Arc::new(MemoryDocumentStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let engine = engine(
        &config,
        source.clone(),
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        objects.clone(),
        CancellationFlag::new(),
    );
    let collections = vec!["ENG".to_string()];

    let first = engine.run(&collections).await;
    assert_eq!(first.collections[0].attachments_relocated, 1);

    let p1 = documents.get("src-P1").unwrap();
    assert!(p1
        .body
        .contains("![diagram.png](s3://bucket/att/P1/att9_diagram.png)"));
    assert_eq!(p1.metadata.version, 1);
    assert_eq!(
        objects.get("bucket", "att/P1/att9_diagram.png").await.unwrap(),
        Some(vec![0x89, 0x50, 0x4e, 0x47])
    );

    // P1 is edited after the first run
    let edited = format!("<p>Revised</p>{}", diagram);
    source.put_page(page("ENG", "P1", 2, Utc::now(), &edited));

    let second = engine.run(&collections).await;
    let eng = &second.collections[0];
    assert_eq!(eng.pages_found, 2);
    assert_eq!(eng.pages_changed, 1);
    assert_eq!(eng.documents_ingested, 1);

    let p1 = documents.get("src-P1").unwrap();
    assert_eq!(p1.metadata.version, 2);
    assert!(p1.body.starts_with("Revised"));
    assert!(p1.body.contains("s3://bucket/att/P1/att9_diagram.png"));
    assert_eq!(documents.len(), 2);
}

#[tokio::test]
async fn test_failed_ingest_is_isolated() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(
        (1..=5)
            .map(|i| page("ENG", &format!("P{}", i), 1, at(i), "<p>text</p>"))
            .collect(),
    ));
    let documents = Arc::new(RejectingStore::new(&["src-P3"]));
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.pages_processed(), 5);
    assert_eq!(result.documents_ingested(), 4);

    let failed: Vec<_> = result.failed_ingests().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].document_id, "src-P3");
    assert_eq!(failed[0].reason.as_deref(), Some("document too large"));

    assert_eq!(
        documents.inner.ids(),
        vec!["src-P1", "src-P2", "src-P4", "src-P5"]
    );
    let eng = &result.collections[0];
    assert_eq!(eng.checkpoint, Some(eng.current_crawl));
}

#[tokio::test]
async fn test_interrupted_run_resumes_after_last_ingested_page() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(
        (1..=4)
            .map(|i| page("ENG", &format!("P{}", i), 1, at(i), "<p>text</p>"))
            .collect(),
    ));
    let memory = Arc::new(MemoryDocumentStore::new());
    let parameters = Arc::new(MemoryParameterStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let cancel = CancellationFlag::new();
    let interrupting = Arc::new(CancellingStore::new(memory.clone(), cancel.clone(), 2));
    let first = engine(
        &config,
        source.clone(),
        interrupting,
        parameters.clone(),
        objects.clone(),
        cancel,
    );

    let result = first.run(&["ENG".to_string()]).await;
    assert_eq!(result.status, ResultStatus::Interrupted);
    assert_eq!(result.collections[0].pages_processed, 2);
    assert_eq!(
        first.tracker().get_checkpoint("ENG").await.unwrap(),
        Some(at(2))
    );

    let resumed = engine(
        &config,
        source,
        memory.clone(),
        parameters,
        objects,
        CancellationFlag::new(),
    );
    let result = resumed.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    let eng = &result.collections[0];
    assert_eq!(eng.last_crawl, Some(at(2)));
    assert_eq!(eng.pages_changed, 2);
    assert_eq!(eng.documents_ingested, 2);
    assert_eq!(memory.len(), 4);
}

#[tokio::test]
async fn test_shared_timestamp_is_not_skipped_on_resume() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(vec![
        page("ENG", "A", 1, at(5), "<p>a</p>"),
        page("ENG", "B", 1, at(5), "<p>b</p>"),
        page("ENG", "C", 1, at(9), "<p>c</p>"),
    ]));
    let memory = Arc::new(MemoryDocumentStore::new());
    let parameters = Arc::new(MemoryParameterStore::new());

    let cancel = CancellationFlag::new();
    let first = engine(
        &config,
        source.clone(),
        Arc::new(CancellingStore::new(memory.clone(), cancel.clone(), 1)),
        parameters.clone(),
        Arc::new(MemoryObjectStore::new()),
        cancel,
    );
    first.run(&["ENG".to_string()]).await;

    // A was ingested but B shares its timestamp, so nothing was recorded
    assert_eq!(first.tracker().get_checkpoint("ENG").await.unwrap(), None);

    let resumed = engine(
        &config,
        source,
        memory.clone(),
        parameters,
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );
    let result = resumed.run(&["ENG".to_string()]).await;
    assert_eq!(result.collections[0].pages_changed, 3);
    assert!(memory.get("src-B").is_some());
}

#[tokio::test]
async fn test_page_edited_during_run_is_resynced_next_run() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    let documents = Arc::new(MemoryDocumentStore::new());
    // B is processed first and edited at the source right after
    let editing = Arc::new(EditingStore::new(
        documents.clone(),
        source.clone(),
        "src-B",
        page("ENG", "B", 3, at(1), "<p>beta edited</p>"),
    ));
    let engine = engine(
        &config,
        source,
        editing,
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );
    let collections = vec!["ENG".to_string()];

    let first = engine.run(&collections).await;
    assert_eq!(first.collections[0].documents_ingested, 3);
    assert_eq!(documents.get("src-B").unwrap().body, "beta & more");

    let second = engine.run(&collections).await;

    assert_eq!(second.status, ResultStatus::Completed);
    assert_eq!(second.collections[0].pages_changed, 1);
    assert_eq!(second.collections[0].documents_ingested, 1);
    assert_eq!(documents.get("src-B").unwrap().body, "beta edited");
    assert_eq!(documents.len(), 3);
}

#[tokio::test]
async fn test_repeated_collection_key_gets_one_worker() {
    let config = test_config(BASE, &["ENG"], "");
    assert!(config.sync.parallel_collections);
    let source = Arc::new(FakeSource::new(three_pages()));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine
        .run(&["ENG".to_string(), "ENG".to_string()])
        .await;

    assert_eq!(result.collections.len(), 1);
    assert_eq!(result.documents_ingested(), 3);
    assert_eq!(documents.len(), 3);
}

#[tokio::test]
async fn test_listing_failure_fails_collection_without_checkpoint() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    source.fail_listing.store(true, Ordering::SeqCst);
    let engine = engine(
        &config,
        source,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Error);
    let eng = &result.collections[0];
    assert_eq!(eng.status, ResultStatus::Error);
    assert!(eng.error.as_deref().unwrap().contains("503"));
    assert_eq!(engine.tracker().get_checkpoint("ENG").await.unwrap(), None);
}

#[tokio::test]
async fn test_rejected_credentials_abort_collection() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    source.reject_credentials.store(true, Ordering::SeqCst);
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(result.collections[0].pages_processed, 1);
    assert!(documents.is_empty());
    assert_eq!(engine.tracker().get_checkpoint("ENG").await.unwrap(), None);
}

#[tokio::test]
async fn test_attachment_listing_failure_degrades() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    source.fail_attachments.store(true, Ordering::SeqCst);
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.documents_ingested(), 3);
    assert_eq!(result.attachment_errors().count(), 3);
}

#[tokio::test]
async fn test_relocation_failure_keeps_original_reference() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/P1/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config(&server.uri(), &["ENG"], "");
    let source = Arc::new(FakeSource::new(vec![page(
        "ENG",
        "P1",
        1,
        at(1),
        r#"<ac:image><ri:attachment ri:filename="missing.png" /></ac:image>"#,
    )]));
    source.set_attachments("P1", vec![image_attachment("P1", "att1", "missing.png")]);
    let documents = Arc::new(MemoryDocumentStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        objects.clone(),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.documents_ingested(), 1);
    let errors: Vec<_> = result.attachment_errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("missing.png"));
    assert!(objects.is_empty());

    let body = documents.get("src-P1").unwrap().body;
    assert_eq!(
        body,
        format!(
            "![missing.png]({}/wiki/download/attachments/P1/missing.png)",
            server.uri()
        )
    );
}

#[tokio::test]
async fn test_pages_listed_without_body_are_fetched() {
    let config = test_config(BASE, &["ENG"], "");
    let source = Arc::new(FakeSource::new(three_pages()));
    source.listing_without_bodies.store(true, Ordering::SeqCst);
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine(
        &config,
        source.clone(),
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    engine.run(&["ENG".to_string()]).await;

    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(documents.get("src-C").unwrap().body, "- gamma");
}

#[tokio::test]
async fn test_parallel_collections_keep_independent_checkpoints() {
    let config = test_config(BASE, &["ENG", "OPS"], "");
    assert!(config.sync.parallel_collections);

    let mut pages = three_pages();
    pages.push(page("OPS", "O1", 1, at(7), "<p>runbook</p>"));
    pages.push(page("OPS", "O2", 1, at(8), "<p>oncall</p>"));
    let source = Arc::new(FakeSource::new(pages));
    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = engine(
        &config,
        source,
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string(), "OPS".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.collections[0].collection_key, "ENG");
    assert_eq!(result.collections[1].collection_key, "OPS");
    assert_eq!(documents.len(), 5);

    let checkpoints = engine.tracker().all_checkpoints().await.unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert!(checkpoints.contains_key("ENG"));
    assert!(checkpoints.contains_key("OPS"));
}

#[tokio::test]
async fn test_sqlite_backed_sync() {
    let config = test_config(BASE, &["ENG"], "");
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let source = Arc::new(FakeSource::new(three_pages()));
    let documents: Arc<dyn DocumentStore> = storage.clone();
    let engine = engine(
        &config,
        source,
        documents,
        Arc::new(MemoryParameterStore::new()),
        Arc::new(MemoryObjectStore::new()),
        CancellationFlag::new(),
    );

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.documents_ingested(), 3);
    assert_eq!(storage.count_documents(Some("ENG")).unwrap(), 3);
    let stored = storage.get_document("src-A").unwrap().unwrap();
    assert_eq!(stored.metadata.title, "Page A");
    assert_eq!(storage.search("gamma", 10).unwrap().len(), 1);
}
