//! JSON shapes returned by the wiki REST API

use crate::model::{Attachment, Page};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

/// One page of a listing; records are decoded individually
#[derive(Debug, Deserialize)]
pub struct ContentList {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Decodes one listing record, describing it by id when it is malformed
pub fn decode_record<T: DeserializeOwned>(record: serde_json::Value) -> Result<T, String> {
    let id = record
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("<no id>")
        .to_string();
    serde_json::from_value(record).map_err(|e| format!("record {}: {}", id, e))
}

#[derive(Debug, Deserialize)]
pub struct WireContent {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub space: Option<WireSpace>,
    #[serde(default)]
    pub version: Option<WireVersion>,
    #[serde(default)]
    pub body: Option<WireBody>,
}

#[derive(Debug, Deserialize)]
pub struct WireSpace {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct WireVersion {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub when: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireBody {
    #[serde(default)]
    pub storage: Option<WireStorage>,
}

#[derive(Debug, Deserialize)]
pub struct WireStorage {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct WireAttachment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub extensions: Option<WireExtensions>,
    #[serde(default)]
    pub metadata: Option<WireAttachmentMetadata>,
    #[serde(rename = "_links", default)]
    pub links: Option<WireLinks>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireExtensions {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachmentMetadata {
    #[serde(default)]
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireLinks {
    #[serde(default)]
    pub download: Option<String>,
}

/// Parses an ISO-8601 timestamp, `None` (treated as changed) when malformed
fn parse_timestamp(page_id: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!("Page {} has unparseable timestamp '{}': {}", page_id, raw, e);
            None
        }
    }
}

impl WireContent {
    pub fn into_page(self, fallback_collection: Option<&str>) -> Page {
        let (version, last_modified) = match self.version {
            Some(v) => {
                let when = v.when.as_deref().and_then(|w| parse_timestamp(&self.id, w));
                (v.number, when)
            }
            None => (None, None),
        };

        Page {
            collection_key: self
                .space
                .map(|s| s.key)
                .or_else(|| fallback_collection.map(str::to_string)),
            version,
            last_modified,
            body: self.body.and_then(|b| b.storage).map(|s| s.value),
            status: self.status.unwrap_or_else(|| "current".to_string()),
            title: self.title,
            id: self.id,
        }
    }
}

impl WireAttachment {
    pub fn into_attachment(self, page_id: &str) -> Attachment {
        let media_type = self
            .extensions
            .as_ref()
            .and_then(|e| e.media_type.clone())
            .or_else(|| self.metadata.and_then(|m| m.media_type))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Attachment {
            id: self.id,
            filename: self.title,
            media_type,
            file_size: self.extensions.and_then(|e| e.file_size).unwrap_or(0),
            page_id: page_id.to_string(),
            download_link: self.links.and_then(|l| l.download).filter(|d| !d.is_empty()),
        }
    }
}
