//! Canonical documents produced for the document store

use crate::model::Page;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Builds the stable document identifier for a page
pub fn document_id(source_prefix: &str, page_id: &str) -> String {
    format!("{}-{}", source_prefix, page_id)
}

/// Metadata attached to every document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub page_id: String,
    pub collection_key: String,
    pub version: u64,
    pub last_modified: Option<String>,
    pub url: Option<String>,
    pub source: String,
}

/// Typed metadata attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Number(f64),
}

impl DocumentMetadata {
    /// Returns the metadata as typed attributes, omitting absent values
    pub fn attributes(&self) -> Vec<(&'static str, AttributeValue)> {
        let mut attributes = vec![
            ("title", AttributeValue::String(self.title.clone())),
            ("page_id", AttributeValue::String(self.page_id.clone())),
            (
                "space_key",
                AttributeValue::String(self.collection_key.clone()),
            ),
            ("version", AttributeValue::Number(self.version as f64)),
        ];

        if let Some(last_modified) = &self.last_modified {
            attributes.push((
                "last_modified",
                AttributeValue::String(last_modified.clone()),
            ));
        }
        if let Some(url) = &self.url {
            attributes.push(("url", AttributeValue::String(url.clone())));
        }
        attributes.push(("source", AttributeValue::String(self.source.clone())));

        attributes
    }
}

/// A normalized document ready for upsert
///
/// Built fresh on every sync of a page and never mutated afterwards; the next
/// sync of the same page supersedes it under the same identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedDocument {
    pub id: String,
    pub body: String,
    pub metadata: DocumentMetadata,
}

impl TransformedDocument {
    /// Builds the document for a page of `collection_key`
    pub fn build(
        source_prefix: &str,
        collection_key: &str,
        page: &Page,
        body: String,
        url: Option<String>,
    ) -> Self {
        Self {
            id: document_id(source_prefix, &page.id),
            body,
            metadata: DocumentMetadata {
                title: page.title.clone(),
                page_id: page.id.clone(),
                collection_key: collection_key.to_string(),
                version: page.version_number(),
                last_modified: page
                    .last_modified
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                url,
                source: source_prefix.to_string(),
            },
        }
    }
}
