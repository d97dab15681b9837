//! Asset relocation
//!
//! Image attachments referenced by a page are downloaded from the wiki,
//! uploaded to object storage under a deterministic key, and every reference
//! in the page markup is tagged with the resulting object URI.
//!
//! # Components
//!
//! - `AssetDownloader`: authenticated GET with manual redirect following
//! - `AssetRelocator`: download, upload and rewrite for one page
//! - `rewrite_references` / `referenced_filenames`: in-place markup edits

mod download;
mod relocate;
mod rewrite;

pub use download::{AssetDownloader, DownloadedAsset};
pub use relocate::{AssetRelocator, RelocationResult};
pub use rewrite::{referenced_filenames, rewrite_references};

use crate::storage::StorageError;
use crate::transform::TransformError;
use thiserror::Error;

/// Attribute added to `ri:attachment` references once relocated
pub const OBJECT_URI_ATTRIBUTE: &str = "ri:object-uri";

/// Errors raised while relocating one attachment
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Refusing non-HTTP URL: {0}")]
    InvalidScheme(String),

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("Redirect from {0} has no usable Location header")]
    MissingLocation(String),

    #[error("Body of {url} exceeds {limit} bytes")]
    TooLarge { limit: u64, url: String },

    #[error("More than {limit} redirects fetching {url}")]
    TooManyRedirects { limit: u32, url: String },

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Could not rewrite references: {0}")]
    Rewrite(#[from] TransformError),
}

/// Resolves the URL an attachment is fetched from
///
/// Absolute download links are used as-is; relative links are joined to the
/// wiki root. Without a link the conventional download path is used, with the
/// filename percent-encoded.
pub fn resolve_fetch_url(
    base_url: &str,
    page_id: &str,
    filename: &str,
    download_link: Option<&str>,
) -> String {
    let base = base_url.trim_end_matches('/');
    match download_link.filter(|l| !l.is_empty()) {
        Some(link) if link.starts_with("http://") || link.starts_with("https://") => {
            link.to_string()
        }
        Some(link) if link.starts_with("/wiki/") => format!("{}{}", base, link),
        Some(link) if link.starts_with('/') => format!("{}/wiki{}", base, link),
        Some(link) => format!("{}/wiki/{}", base, link),
        None => format!(
            "{}/wiki/download/attachments/{}/{}",
            base,
            urlencoding::encode(page_id),
            urlencoding::encode(filename)
        ),
    }
}
