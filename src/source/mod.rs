//! Page source client
//!
//! This module enumerates pages and attachments from the remote wiki:
//! - `PageSource`: the seam the sync engine consumes
//! - `HttpPageSource`: paginated REST implementation
//! - `Credentials`: Basic or Bearer authentication shared with asset downloads

mod credentials;
mod http;
mod wire;

pub use credentials::Credentials;
pub use http::{ensure_http_scheme, HttpPageSource};

use crate::model::{Attachment, Page};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while talking to the page source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Refusing non-HTTP URL: {0}")]
    InvalidScheme(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Source rejected credentials (HTTP {status}) for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Authentication failures stop the whole collection rather than one page
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::InvalidScheme(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Records of a listing plus descriptions of the ones that could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub skipped: Vec<String>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            skipped: Vec::new(),
        }
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Read access to the pages of a wiki
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Lists every current page of a collection
    ///
    /// Pagination is internal: the result is either the complete listing or
    /// an error, never a partial listing. Malformed records are reported in
    /// `Listing::skipped` instead of failing the call.
    async fn list_pages(&self, collection_key: &str) -> Result<Listing<Page>, SourceError>;

    /// Fetches a page by id with its body, `None` if it does not exist
    async fn get_page(&self, page_id: &str) -> Result<Option<Page>, SourceError>;

    /// Lists the attachments of a page
    async fn list_attachments(&self, page_id: &str) -> Result<Listing<Attachment>, SourceError>;
}
