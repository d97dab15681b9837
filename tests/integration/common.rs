//! Shared fixtures: an in-process page source and wrapping document stores

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{redirect::Policy, Client};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use wiki_sync::assets::{AssetDownloader, AssetRelocator};
use wiki_sync::config::{parse_config, Config};
use wiki_sync::model::{Attachment, IngestStatus, Page, SyncOutcome, TransformedDocument};
use wiki_sync::source::{Credentials, Listing, PageSource, SourceError};
use wiki_sync::state::{CancellationFlag, CrawlStateTracker};
use wiki_sync::storage::{
    DocumentStore, MemoryDocumentStore, MemoryObjectStore, MemoryParameterStore, ObjectStore,
    ParameterStore, StorageResult,
};
use wiki_sync::SyncEngine;

pub const TOKEN: &str = "secret-token";

/// Parses a configuration for a wiki at `base_url` syncing `collections`
pub fn test_config(base_url: &str, collections: &[&str], extra: &str) -> Config {
    let mut token = NamedTempFile::new().unwrap();
    writeln!(token, "{}", TOKEN).unwrap();

    let collections = collections
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let toml = format!(
        r#"
[source]
base-url = "{}"
api-token-file = "{}"
collections = [{}]
page-size = 2

[storage]
attachments-uri = "s3://bucket/att/"

[index]
source-prefix = "src"

[checkpoint]
base-delay-ms = 1
{}
"#,
        base_url,
        token.path().display().to_string().replace('\\', "/"),
        collections,
        extra
    );
    parse_config(&toml).unwrap()
}

/// Timestamp on a fixed day, `minute` minutes past 10:00
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
}

pub fn page(collection: &str, id: &str, version: u64, modified: DateTime<Utc>, body: &str) -> Page {
    Page {
        id: id.to_string(),
        title: format!("Page {}", id),
        status: "current".to_string(),
        collection_key: Some(collection.to_string()),
        version: Some(version),
        last_modified: Some(modified),
        body: Some(body.to_string()),
    }
}

pub fn image_attachment(page_id: &str, id: &str, filename: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        filename: filename.to_string(),
        media_type: "image/png".to_string(),
        file_size: 4,
        page_id: page_id.to_string(),
        download_link: None,
    }
}

/// Page source backed by in-memory pages
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<Vec<Page>>,
    attachments: Mutex<HashMap<String, Vec<Attachment>>>,
    pub fail_listing: AtomicBool,
    pub fail_attachments: AtomicBool,
    pub reject_credentials: AtomicBool,
    /// List pages without bodies so the engine fetches them by id
    pub listing_without_bodies: AtomicBool,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages: Mutex::new(pages),
            ..Default::default()
        }
    }

    /// Inserts or replaces a page by id
    pub fn put_page(&self, page: Page) {
        let mut pages = self.pages.lock().unwrap();
        pages.retain(|p| p.id != page.id);
        pages.push(page);
    }

    pub fn set_attachments(&self, page_id: &str, attachments: Vec<Attachment>) {
        self.attachments
            .lock()
            .unwrap()
            .insert(page_id.to_string(), attachments);
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn list_pages(&self, collection_key: &str) -> Result<Listing<Page>, SourceError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SourceError::Http {
                status: 503,
                url: "fake://content".to_string(),
            });
        }
        let strip = self.listing_without_bodies.load(Ordering::SeqCst);
        let pages = self
            .pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.collection_key.as_deref() == Some(collection_key))
            .cloned()
            .map(|mut p| {
                if strip {
                    p.body = None;
                }
                p
            })
            .collect();
        Ok(Listing::new(pages))
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<Page>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == page_id)
            .cloned())
    }

    async fn list_attachments(&self, page_id: &str) -> Result<Listing<Attachment>, SourceError> {
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(SourceError::Unauthorized {
                status: 401,
                url: format!("fake://content/{}/child/attachment", page_id),
            });
        }
        if self.fail_attachments.load(Ordering::SeqCst) {
            return Err(SourceError::Http {
                status: 500,
                url: format!("fake://content/{}/child/attachment", page_id),
            });
        }
        let attachments = self
            .attachments
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .unwrap_or_default();
        Ok(Listing::new(attachments))
    }
}

/// Document store rejecting a fixed set of identifiers
pub struct RejectingStore {
    pub inner: MemoryDocumentStore,
    rejected: HashSet<String>,
}

impl RejectingStore {
    pub fn new(rejected: &[&str]) -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            rejected: rejected.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for RejectingStore {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        let mut outcomes = Vec::new();
        for document in documents {
            if self.rejected.contains(&document.id) {
                outcomes.push(SyncOutcome {
                    document_id: document.id.clone(),
                    status: IngestStatus::Failed,
                    reason: Some("document too large".to_string()),
                });
            } else {
                outcomes.extend(self.inner.upsert(std::slice::from_ref(document)).await?);
            }
        }
        Ok(outcomes)
    }
}

/// Document store that requests cancellation after a number of upserts
pub struct CancellingStore {
    pub inner: Arc<MemoryDocumentStore>,
    cancel: CancellationFlag,
    after: usize,
    count: AtomicUsize,
}

impl CancellingStore {
    pub fn new(inner: Arc<MemoryDocumentStore>, cancel: CancellationFlag, after: usize) -> Self {
        Self {
            inner,
            cancel,
            after,
            count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for CancellingStore {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        let outcomes = self.inner.upsert(documents).await?;
        if self.count.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.cancel.cancel();
        }
        Ok(outcomes)
    }
}

/// Document store that edits a page at the source right after ingesting it
pub struct EditingStore {
    pub inner: Arc<MemoryDocumentStore>,
    source: Arc<FakeSource>,
    document_id: String,
    edit: Mutex<Option<Page>>,
}

impl EditingStore {
    /// Once `document_id` is upserted, `edit` replaces its page stamped with the current time
    pub fn new(
        inner: Arc<MemoryDocumentStore>,
        source: Arc<FakeSource>,
        document_id: &str,
        edit: Page,
    ) -> Self {
        Self {
            inner,
            source,
            document_id: document_id.to_string(),
            edit: Mutex::new(Some(edit)),
        }
    }
}

#[async_trait]
impl DocumentStore for EditingStore {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        let outcomes = self.inner.upsert(documents).await?;
        if documents.iter().any(|d| d.id == self.document_id) {
            if let Some(mut page) = self.edit.lock().unwrap().take() {
                page.last_modified = Some(Utc::now());
                self.source.put_page(page);
            }
        }
        Ok(outcomes)
    }
}

/// Builds an engine over explicit collaborators
///
/// Attachments are downloaded from the configured base URL with a bearer
/// credential.
pub fn engine(
    config: &Config,
    source: Arc<FakeSource>,
    documents: Arc<dyn DocumentStore>,
    parameters: Arc<MemoryParameterStore>,
    objects: Arc<MemoryObjectStore>,
    cancel: CancellationFlag,
) -> SyncEngine {
    let client = Client::builder().redirect(Policy::none()).build().unwrap();
    let downloader = AssetDownloader::with_client(
        client,
        Credentials::Bearer {
            token: TOKEN.to_string(),
        },
        5,
        Vec::new(),
    );
    let objects: Arc<dyn ObjectStore> = objects;
    let relocator = AssetRelocator::new(
        downloader,
        objects,
        config.storage.target().unwrap(),
        config.storage.storage_class,
        config.source.base_url(),
    );
    let parameters: Arc<dyn ParameterStore> = parameters;
    let tracker = CrawlStateTracker::with_policy(
        parameters,
        &config.checkpoint.parameter_name,
        3,
        Duration::from_millis(1),
    );

    SyncEngine::new(
        Arc::new(config.clone()),
        source,
        Arc::new(relocator),
        documents,
        Arc::new(tracker),
        cancel,
    )
}
