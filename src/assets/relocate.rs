//! Per-page relocation of image attachments into object storage

use super::{referenced_filenames, resolve_fetch_url, rewrite_references, AssetDownloader, AssetError};
use crate::config::{AttachmentsTarget, StorageClass};
use crate::model::Attachment;
use crate::storage::{validate_object_key, ObjectStore};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of relocating one page's attachments
///
/// Never an error: failures are collected in `errors` and the affected
/// references are left as they were.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelocationResult {
    /// Page markup with relocated references rewritten
    pub content: String,
    /// Image attachments referenced by the markup
    pub processed: usize,
    /// Attachments uploaded and rewritten successfully
    pub uploaded: usize,
    pub errors: Vec<String>,
}

/// Downloads, uploads and rewrites attachment references for a page
pub struct AssetRelocator {
    downloader: AssetDownloader,
    store: Arc<dyn ObjectStore>,
    target: AttachmentsTarget,
    storage_class: StorageClass,
    base_url: String,
}

impl AssetRelocator {
    pub fn new(
        downloader: AssetDownloader,
        store: Arc<dyn ObjectStore>,
        target: AttachmentsTarget,
        storage_class: StorageClass,
        base_url: &str,
    ) -> Self {
        Self {
            downloader,
            store,
            target,
            storage_class,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Object key of an attachment: `<prefix><page_id>/<attachment_id>_<filename>`
    pub fn object_key(&self, page_id: &str, attachment: &Attachment) -> String {
        format!(
            "{}{}/{}_{}",
            self.target.prefix, page_id, attachment.id, attachment.filename
        )
    }

    /// URI recorded in rewritten references
    pub fn object_uri(&self, key: &str) -> String {
        format!("{}://{}/{}", self.target.scheme, self.target.bucket, key)
    }

    async fn relocate_one(
        &self,
        page_id: &str,
        content: &str,
        attachment: &Attachment,
    ) -> Result<String, AssetError> {
        let url = resolve_fetch_url(
            &self.base_url,
            page_id,
            &attachment.filename,
            attachment.download_link.as_deref(),
        );
        let asset = self.downloader.download(&url).await?;

        let key = self.object_key(page_id, attachment);
        validate_object_key(&key)?;
        let content_type = asset
            .content_type
            .as_deref()
            .unwrap_or(attachment.media_type.as_str());

        self.store
            .put(
                &self.target.bucket,
                &key,
                asset.bytes,
                Some(content_type),
                self.storage_class,
            )
            .await?;

        let uri = self.object_uri(&key);
        debug!("Uploaded {} to {}", attachment.filename, uri);
        Ok(rewrite_references(content, &attachment.filename, &uri)?)
    }

    /// Relocates every image attachment referenced by `content`
    pub async fn relocate(
        &self,
        page_id: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> RelocationResult {
        let mut result = RelocationResult {
            content: content.to_string(),
            ..Default::default()
        };

        let referenced = match referenced_filenames(content) {
            Ok(referenced) => referenced,
            Err(e) => {
                error!("Cannot scan page {} for attachments: {}", page_id, e);
                result
                    .errors
                    .push(format!("page {}: cannot scan references: {}", page_id, e));
                return result;
            }
        };

        for attachment in attachments
            .iter()
            .filter(|a| a.is_image() && referenced.contains(&a.filename))
        {
            result.processed += 1;
            match self.relocate_one(page_id, &result.content, attachment).await {
                Ok(rewritten) => {
                    result.content = rewritten;
                    result.uploaded += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to relocate {} on page {}: {}",
                        attachment.filename, page_id, e
                    );
                    result.errors.push(format!(
                        "page {}: {}: {}",
                        page_id, attachment.filename, e
                    ));
                }
            }
        }

        if result.processed > 0 {
            info!(
                "Relocated {}/{} attachments of page {}",
                result.uploaded, result.processed, page_id
            );
        }
        result
    }
}
