//! Document sync engine
//!
//! Drives each collection through
//! `determine-scope -> per-page{fetch -> relocate -> transform -> build -> upsert} -> checkpoint`.
//!
//! Pages within a collection are processed sequentially, oldest first, so an
//! advanced checkpoint always implies everything before it was handled.
//! Collections are independent and run one worker each.

mod scope;

pub use scope::{checkpoint_candidate, select_pages};

use crate::assets::{AssetDownloader, AssetRelocator};
use crate::config::Config;
use crate::model::{Page, SyncOutcome, TransformedDocument};
use crate::output::{CollectionResult, ResultStatus, RunResult};
use crate::source::{HttpPageSource, PageSource, SourceError};
use crate::state::{CancellationFlag, CrawlStateTracker};
use crate::storage::{DocumentStore, ObjectStore, ParameterStore};
use crate::transform::{ContentTransformer, PageContext};
use crate::{ConfigError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a run would do for one collection, without side effects
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub collection_key: String,
    pub last_crawl: Option<DateTime<Utc>>,
    pub pages_found: usize,
    /// Pages that would be processed, in processing order
    pub pages: Vec<Page>,
}

/// How a single page ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    Ingested,
    Rejected,
    Skipped,
}

/// Orchestrates a sync run
///
/// Cloning is cheap: every collaborator is shared.
#[derive(Clone)]
pub struct SyncEngine {
    config: Arc<Config>,
    source: Arc<dyn PageSource>,
    relocator: Arc<AssetRelocator>,
    transformer: ContentTransformer,
    documents: Arc<dyn DocumentStore>,
    tracker: Arc<CrawlStateTracker>,
    cancel: CancellationFlag,
}

impl SyncEngine {
    /// Creates an engine from explicit collaborators
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn PageSource>,
        relocator: Arc<AssetRelocator>,
        documents: Arc<dyn DocumentStore>,
        tracker: Arc<CrawlStateTracker>,
        cancel: CancellationFlag,
    ) -> Self {
        let transformer = ContentTransformer::new(config.source.base_url());
        Self {
            config,
            source,
            relocator,
            transformer,
            documents,
            tracker,
            cancel,
        }
    }

    /// Creates an engine talking to the configured wiki over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration with resolved credentials
    /// * `objects` - Destination of relocated attachments
    /// * `documents` - Document store receiving upserts
    /// * `parameters` - Backing store of the checkpoint parameter
    /// * `cancel` - Flag checked between pages
    pub fn from_config(
        config: Arc<Config>,
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        parameters: Arc<dyn ParameterStore>,
        cancel: CancellationFlag,
    ) -> Result<Self> {
        let target = config.storage.target().ok_or_else(|| {
            ConfigError::Validation(format!(
                "invalid attachments-uri '{}'",
                config.storage.attachments_uri
            ))
        })?;

        let source = HttpPageSource::new(&config.source)?;
        let relocator = AssetRelocator::new(
            AssetDownloader::new(&config)?,
            objects,
            target,
            config.storage.storage_class,
            config.source.base_url(),
        );
        let tracker = CrawlStateTracker::new(parameters, &config.checkpoint);

        Ok(Self::new(
            config,
            Arc::new(source),
            Arc::new(relocator),
            documents,
            Arc::new(tracker),
            cancel,
        ))
    }

    pub fn tracker(&self) -> &CrawlStateTracker {
        &self.tracker
    }

    /// Clears the checkpoints of `collections`, forcing a full resync
    pub async fn reset(&self, collections: &[String]) -> Result<()> {
        for key in collections {
            if self.tracker.clear_checkpoint(key).await? {
                info!("Checkpoint of {} cleared; next sync is a first run", key);
            }
        }
        Ok(())
    }

    /// Syncs every collection and aggregates the results
    ///
    /// Never fails: collection-level errors are reported in the result.
    pub async fn run(&self, collections: &[String]) -> RunResult {
        let started_at = Utc::now();
        // One worker per collection, even when a key is requested twice
        let mut seen = HashSet::new();
        let collections: Vec<&str> = collections
            .iter()
            .map(String::as_str)
            .filter(|key| seen.insert(*key))
            .collect();
        info!("Starting sync of {} collections", collections.len());

        let mut results = Vec::with_capacity(collections.len());
        if self.config.sync.parallel_collections && collections.len() > 1 {
            let handles: Vec<_> = collections
                .iter()
                .map(|&key| {
                    let engine = self.clone();
                    let worker_key = key.to_string();
                    let handle =
                        tokio::spawn(async move { engine.sync_collection(&worker_key).await });
                    (key, handle)
                })
                .collect();

            for (key, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Worker for {} failed: {}", key, e);
                        CollectionResult::new(key, started_at)
                            .fail(format!("collection worker failed: {}", e))
                    }
                };
                results.push(result);
            }
        } else {
            for key in collections {
                results.push(self.sync_collection(key).await);
            }
        }

        let result = RunResult::from_collections(results, started_at, Utc::now());
        info!(
            "Sync {}: {} pages processed, {} documents ingested, {} failed ingests",
            result.status,
            result.pages_processed(),
            result.documents_ingested(),
            result.failed_ingests().count()
        );
        result
    }

    /// Syncs one collection
    pub async fn sync_collection(&self, collection_key: &str) -> CollectionResult {
        // Captured before listing so pages edited mid-run are seen next time
        let run_start = Utc::now();
        let mut result = CollectionResult::new(collection_key, run_start);

        if let Err(e) = self.process_collection(collection_key, run_start, &mut result).await {
            error!("Sync of {} failed: {}", collection_key, e);
            result.status = ResultStatus::Error;
            result.error = Some(e.to_string());
        }
        result
    }

    /// Lists what a run would process, without relocating or upserting
    pub async fn plan_collection(&self, collection_key: &str) -> Result<CollectionPlan> {
        let last_crawl = self.tracker.get_checkpoint(collection_key).await?;
        let pages = self.source.list_pages(collection_key).await?.items;
        let pages_found = pages.len();

        Ok(CollectionPlan {
            collection_key: collection_key.to_string(),
            last_crawl,
            pages_found,
            pages: select_pages(pages, last_crawl),
        })
    }

    async fn process_collection(
        &self,
        collection_key: &str,
        run_start: DateTime<Utc>,
        result: &mut CollectionResult,
    ) -> Result<()> {
        let last_crawl = self.tracker.get_checkpoint(collection_key).await?;
        result.last_crawl = last_crawl;
        result.is_first_crawl = last_crawl.is_none();

        let listing = self.source.list_pages(collection_key).await?;
        result.pages_found = listing.items.len();
        result.page_errors.extend(
            listing
                .skipped
                .into_iter()
                .map(|reason| format!("{}: malformed page {}", collection_key, reason)),
        );
        let pages = select_pages(listing.items, last_crawl);
        result.pages_changed = pages.len();

        match last_crawl {
            Some(since) => info!(
                "{}: {} of {} pages changed since {}",
                collection_key,
                pages.len(),
                result.pages_found,
                since
            ),
            None => info!(
                "{}: first sync, processing all {} pages",
                collection_key,
                pages.len()
            ),
        }

        let mut checkpoint = last_crawl;
        for (index, page) in pages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "{}: cancelled after {} of {} pages",
                    collection_key,
                    index,
                    pages.len()
                );
                result.status = ResultStatus::Interrupted;
                return Ok(());
            }

            result.pages_processed += 1;
            let outcome = self.sync_page(collection_key, page, result).await?;

            if outcome == PageOutcome::Ingested {
                if let Some(ts) = checkpoint_candidate(&pages, index) {
                    if checkpoint.map_or(true, |current| ts > current) {
                        self.tracker.save_checkpoint(collection_key, ts).await?;
                        checkpoint = Some(ts);
                        result.checkpoint = Some(ts);
                    }
                }
            }
        }

        self.tracker.save_checkpoint(collection_key, run_start).await?;
        result.checkpoint = Some(run_start);

        info!(
            "{}: {} pages processed, {} ingested, {} failed",
            collection_key,
            result.pages_processed,
            result.documents_ingested,
            result.pages_failed()
        );
        Ok(())
    }

    /// Processes one page; only authentication failures escape as errors
    async fn sync_page(
        &self,
        collection_key: &str,
        listed: &Page,
        result: &mut CollectionResult,
    ) -> std::result::Result<PageOutcome, SourceError> {
        let fetched;
        let page = if listed.body().is_some() {
            listed
        } else {
            match self.source.get_page(&listed.id).await {
                Ok(Some(page)) => {
                    fetched = page;
                    &fetched
                }
                Ok(None) => {
                    warn!("Page {} disappeared before it could be fetched", listed.id);
                    result
                        .page_errors
                        .push(format!("page {}: not found", listed.id));
                    return Ok(PageOutcome::Skipped);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to fetch page {}: {}", listed.id, e);
                    result
                        .page_errors
                        .push(format!("page {}: {}", listed.id, e));
                    return Ok(PageOutcome::Skipped);
                }
            }
        };

        let attachments = match self.source.list_attachments(&page.id).await {
            Ok(listing) => {
                result.attachment_errors.extend(
                    listing
                        .skipped
                        .into_iter()
                        .map(|reason| format!("page {}: malformed attachment {}", page.id, reason)),
                );
                listing.items
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Cannot list attachments of page {}: {}", page.id, e);
                result
                    .attachment_errors
                    .push(format!("page {}: cannot list attachments: {}", page.id, e));
                Vec::new()
            }
        };

        let raw = page.body().unwrap_or_default();
        let relocation = self.relocator.relocate(&page.id, raw, &attachments).await;
        result.attachments_relocated += relocation.uploaded;
        result.attachment_errors.extend(relocation.errors);

        let body = self.transformer.transform(
            &relocation.content,
            PageContext {
                page_id: &page.id,
                collection_key,
                attachments: &attachments,
            },
        );
        let document = TransformedDocument::build(
            &self.config.index.source_prefix,
            collection_key,
            page,
            body,
            Some(self.page_url(collection_key, &page.id)),
        );

        let outcome = match self.documents.upsert(std::slice::from_ref(&document)).await {
            Ok(outcomes) => outcomes
                .into_iter()
                .find(|o| o.document_id == document.id)
                .unwrap_or_else(|| SyncOutcome::failed(&document.id, "no outcome returned")),
            Err(e) => SyncOutcome::failed(&document.id, e.to_string()),
        };

        if outcome.is_success() {
            debug!(
                "Ingested {} (page {} v{}) as {}",
                document.id,
                page.id,
                page.version_number(),
                outcome.status
            );
            result.documents_ingested += 1;
            Ok(PageOutcome::Ingested)
        } else {
            warn!(
                "Document {} was not ingested ({}): {}",
                outcome.document_id,
                outcome.status,
                outcome.reason.as_deref().unwrap_or("no reason given")
            );
            result.failed_ingests.push(outcome);
            Ok(PageOutcome::Rejected)
        }
    }

    /// Canonical URL of a page
    pub fn page_url(&self, collection_key: &str, page_id: &str) -> String {
        format!(
            "{}/wiki/spaces/{}/pages/{}",
            self.config.source.base_url(),
            urlencoding::encode(collection_key),
            urlencoding::encode(page_id)
        )
    }
}
