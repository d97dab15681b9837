//! Source-side records: pages and their attachments

use chrono::{DateTime, Utc};

/// A wiki page as enumerated by the page source
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Opaque identifier, stable across edits
    pub id: String,
    pub title: String,
    /// Lifecycle status reported by the source (e.g. `current`)
    pub status: String,
    /// Key of the collection the page belongs to, when the source reported it
    pub collection_key: Option<String>,
    /// Version number, absent when the source sent no version metadata
    pub version: Option<u64>,
    /// Last-modified time of the current version
    pub last_modified: Option<DateTime<Utc>>,
    /// Raw structured-markup body
    pub body: Option<String>,
}

impl Page {
    /// Version number, defaulting to 1 when the source sent none
    pub fn version_number(&self) -> u64 {
        self.version.unwrap_or(1)
    }

    /// Returns the markup body if present and non-empty
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.is_empty())
    }

    /// Returns true if the page must be reprocessed for a checkpoint at `since`
    ///
    /// Missing version metadata or an unknown modification time counts as
    /// changed.
    pub fn has_changed_since(&self, since: DateTime<Utc>) -> bool {
        if self.version.is_none() {
            return true;
        }
        match self.last_modified {
            Some(when) => when > since,
            None => true,
        }
    }
}

/// A binary attachment owned by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    /// Unique within a page; join key against markup references
    pub filename: String,
    pub media_type: String,
    pub file_size: u64,
    pub page_id: String,
    /// Download link declared by the source, usually relative to the wiki root
    pub download_link: Option<String>,
}

impl Attachment {
    /// Only image attachments are relocated
    pub fn is_image(&self) -> bool {
        self.media_type.to_ascii_lowercase().starts_with("image/")
    }
}
