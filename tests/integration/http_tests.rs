//! End-to-end tests against mock wiki, download and index servers

use crate::common::{test_config, TOKEN};
use reqwest::{redirect::Policy, Client};
use serde_json::json;
use std::sync::Arc;
use wiki_sync::assets::{AssetDownloader, AssetError};
use wiki_sync::output::ResultStatus;
use wiki_sync::source::{Credentials, HttpPageSource, PageSource};
use wiki_sync::state::CancellationFlag;
use wiki_sync::storage::{
    HttpDocumentStore, MemoryDocumentStore, MemoryObjectStore, MemoryParameterStore, ObjectStore,
};
use wiki_sync::SyncEngine;
use wiremock::matchers::{
    body_partial_json, header, header_exists, method, path, path_regex, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wire_page(id: &str, version: u64, when: &str, body: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "page",
        "status": "current",
        "title": format!("Page {}", id),
        "space": {"key": "ENG"},
        "version": {"number": version, "when": when},
        "body": {"storage": {"value": body, "representation": "storage"}}
    })
}

/// Mounts a three-page collection split over two listing pages of size 2
async fn mount_wiki(server: &MockServer) {
    let auth = format!("Bearer {}", TOKEN);

    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("spaceKey", "ENG"))
        .and(query_param("start", "0"))
        .and(header("authorization", auth.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                wire_page(
                    "P1",
                    1,
                    "2024-03-01T10:01:00.000Z",
                    r#"<p>Design</p><ac:image><ri:attachment ri:filename="diagram.png" /></ac:image>"#
                ),
                wire_page("P2", 3, "2024-03-01T10:02:00.000Z", "<p>Second</p>")
            ],
            "limit": 2,
            "size": 2
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("spaceKey", "ENG"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [wire_page("P3", 1, "not a timestamp", "<p>Third</p>")],
            "limit": 2,
            "size": 1
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/P1/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "id": "att9",
                "title": "diagram.png",
                "extensions": {"mediaType": "image/png", "fileSize": 4},
                "_links": {"download": "/download/attachments/P1/diagram.png?version=1&api=v2"}
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/wiki/rest/api/content/P[23]/child/attachment$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/P1/diagram.png"))
        .and(query_param("version", "1"))
        .and(header("authorization", auth.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1, 2, 3, 4]),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_listing_paginates_until_short_page() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;

    let config = test_config(&server.uri(), &["ENG"], "");
    let source = HttpPageSource::new(&config.source).unwrap();

    let pages = source.list_pages("ENG").await.unwrap().items;

    let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["P1", "P2", "P3"]);
    assert_eq!(pages[1].version, Some(3));
    assert_eq!(pages[0].collection_key.as_deref(), Some("ENG"));
    // Unparseable timestamps are treated as changed
    assert!(pages[2].last_modified.is_none());
}

#[tokio::test]
async fn test_full_sync_over_http() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;

    let config = Arc::new(test_config(&server.uri(), &["ENG"], ""));
    let documents = Arc::new(MemoryDocumentStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let parameters = Arc::new(MemoryParameterStore::new());
    let engine = SyncEngine::from_config(
        config,
        objects.clone(),
        documents.clone(),
        parameters,
        CancellationFlag::new(),
    )
    .unwrap();

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.documents_ingested(), 3);
    assert_eq!(result.attachment_errors().count(), 0);
    assert_eq!(documents.ids(), vec!["src-P1", "src-P2", "src-P3"]);

    let p1 = documents.get("src-P1").unwrap();
    assert_eq!(
        p1.body,
        "Design\n\n![diagram.png](s3://bucket/att/P1/att9_diagram.png)"
    );
    assert_eq!(
        p1.metadata.url,
        Some(format!("{}/wiki/spaces/ENG/pages/P1", server.uri()))
    );

    let info = objects
        .head("bucket", "att/P1/att9_diagram.png")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.size, 4);
    assert_eq!(info.content_type.as_deref(), Some("image/png"));

    let checkpoint = engine.tracker().get_checkpoint("ENG").await.unwrap();
    assert_eq!(checkpoint, Some(result.collections[0].current_crawl));
}

#[tokio::test]
async fn test_sync_into_http_index_reports_rejections() {
    let wiki = MockServer::start().await;
    mount_wiki(&wiki).await;

    let index = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(body_partial_json(json!({"documents": [{"content": {"custom": {
            "customDocumentIdentifier": {"id": "src-P2"}
        }}}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentDetails": [{
                "identifier": {"custom": {"id": "src-P2"}},
                "status": "FAILED",
                "statusReason": "content too large"
            }]
        })))
        .mount(&index)
        .await;
    for id in ["src-P1", "src-P3"] {
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(body_partial_json(json!({"documents": [{"content": {"custom": {
                "customDocumentIdentifier": {"id": id}
            }}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documentDetails": [{"identifier": {"custom": {"id": id}}, "status": "STARTING"}]
            })))
            .mount(&index)
            .await;
    }

    let config = Arc::new(test_config(&wiki.uri(), &["ENG"], ""));
    let documents = Arc::new(
        HttpDocumentStore::new(
            &format!("{}/ingest", index.uri()),
            None,
            std::time::Duration::from_secs(5),
        )
        .unwrap(),
    );
    let engine = SyncEngine::from_config(
        config,
        Arc::new(MemoryObjectStore::new()),
        documents,
        Arc::new(MemoryParameterStore::new()),
        CancellationFlag::new(),
    )
    .unwrap();

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(result.documents_ingested(), 2);
    let failed: Vec<_> = result.failed_ingests().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].document_id, "src-P2");
    assert_eq!(failed[0].reason.as_deref(), Some("content too large"));
}

#[tokio::test]
async fn test_malformed_records_are_skipped_individually() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                wire_page(
                    "G1",
                    1,
                    "2024-03-01T10:01:00.000Z",
                    r#"<p>Good</p><ac:image><ri:attachment ri:filename="ok.png" /></ac:image>"#
                ),
                {"id": "B2", "title": null, "version": {"number": 1, "when": "2024-03-01T10:02:00.000Z"}}
            ],
            "limit": 2,
            "size": 2
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/rest/api/content/G1/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "id": "att1",
                    "title": "ok.png",
                    "extensions": {"mediaType": "image/png", "fileSize": 3},
                    "_links": {"download": "/download/attachments/G1/ok.png"}
                },
                {
                    "id": "att2",
                    "extensions": {"mediaType": "image/png", "fileSize": 3}
                }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/G1/ok.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1, 2, 3]),
        )
        .mount(&server)
        .await;

    let config = Arc::new(test_config(&server.uri(), &["ENG"], ""));

    let listing = HttpPageSource::new(&config.source)
        .unwrap()
        .list_pages("ENG")
        .await
        .unwrap();
    let ids: Vec<_> = listing.items.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["G1"]);
    assert_eq!(listing.skipped.len(), 1);
    assert!(listing.skipped[0].contains("B2"));

    let documents = Arc::new(MemoryDocumentStore::new());
    let engine = SyncEngine::from_config(
        config,
        Arc::new(MemoryObjectStore::new()),
        documents.clone(),
        Arc::new(MemoryParameterStore::new()),
        CancellationFlag::new(),
    )
    .unwrap();

    let result = engine.run(&["ENG".to_string()]).await;

    assert_eq!(result.status, ResultStatus::Completed);
    assert_eq!(documents.ids(), vec!["src-G1"]);
    assert_eq!(result.collections[0].attachments_relocated, 1);

    let page_errors: Vec<_> = result.page_errors().collect();
    assert_eq!(page_errors.len(), 1);
    assert!(page_errors[0].contains("B2"));
    let attachment_errors: Vec<_> = result.attachment_errors().collect();
    assert_eq!(attachment_errors.len(), 1);
    assert!(attachment_errors[0].contains("att2"));

    let body = documents.get("src-G1").unwrap().body;
    assert!(body.contains("s3://bucket/att/G1/att1_ok.png"));
}

fn downloader(trusted_hosts: Vec<String>) -> AssetDownloader {
    let client = Client::builder().redirect(Policy::none()).build().unwrap();
    AssetDownloader::with_client(
        client,
        Credentials::Bearer {
            token: TOKEN.to_string(),
        },
        5,
        trusted_hosts,
    )
}

/// Wiki redirecting its download to a blob server on another origin
async fn mount_cross_origin_redirect() -> (MockServer, MockServer) {
    let wiki = MockServer::start().await;
    let blobs = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/P1/a.png"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/blob/a.png", blobs.uri()).as_str()),
        )
        .mount(&wiki)
        .await;

    // Credentials reaching the blob server are a leak
    Mock::given(method("GET"))
        .and(path("/blob/a.png"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&blobs)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .mount(&blobs)
        .await;

    (wiki, blobs)
}

#[tokio::test]
async fn test_cross_origin_redirect_drops_credentials() {
    let (wiki, blobs) = mount_cross_origin_redirect().await;

    let asset = downloader(Vec::new())
        .download(&format!("{}/wiki/download/attachments/P1/a.png", wiki.uri()))
        .await
        .unwrap();

    assert_eq!(asset.bytes, b"png".to_vec());
    assert_eq!(asset.final_url, format!("{}/blob/a.png", blobs.uri()));
}

#[tokio::test]
async fn test_trusted_redirect_host_receives_credentials() {
    let (wiki, _blobs) = mount_cross_origin_redirect().await;

    let err = downloader(vec!["127.0.0.1".to_string()])
        .download(&format!("{}/wiki/download/attachments/P1/a.png", wiki.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, AssetError::Http { status: 403, .. }));
}
