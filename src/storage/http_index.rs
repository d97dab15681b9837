//! Remote document store speaking a batch ingest protocol over HTTP
//!
//! Each call posts `{"documents": [...]}` where every document carries a
//! custom identifier, inline text content and typed inline attributes. The
//! response lists one `documentDetails` entry per accepted identifier.

use crate::model::{AttributeValue, IngestStatus, SyncOutcome, TransformedDocument};
use crate::storage::traits::{DocumentStore, StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Document store client for an HTTP ingest endpoint
pub struct HttpDocumentStore {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestRequest {
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    #[serde(default)]
    document_details: Vec<DocumentDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentDetail {
    identifier: DetailIdentifier,
    status: String,
    #[serde(default)]
    status_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailIdentifier {
    custom: Option<CustomIdentifier>,
}

#[derive(Debug, Deserialize)]
struct CustomIdentifier {
    id: String,
}

impl HttpDocumentStore {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("wiki-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Remote(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            token,
        })
    }
}

/// Serializes one document into the ingest wire shape
fn document_payload(doc: &TransformedDocument) -> Value {
    let attributes: Vec<Value> = doc
        .metadata
        .attributes()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                AttributeValue::String(s) => json!({"type": "STRING", "stringValue": s}),
                AttributeValue::Number(n) => json!({"type": "NUMBER", "numberValue": n}),
            };
            json!({"key": key, "value": value})
        })
        .collect();

    json!({
        "content": {
            "dataSourceType": "CUSTOM",
            "custom": {
                "customDocumentIdentifier": {"id": doc.id},
                "sourceType": "IN_LINE",
                "inlineContent": {
                    "type": "TEXT",
                    "textContent": {"data": doc.body}
                }
            }
        },
        "metadata": {
            "type": "IN_LINE_ATTRIBUTE",
            "inlineAttributes": attributes
        }
    })
}

/// Pairs every submitted document with the status reported for it
fn collect_outcomes(
    documents: &[TransformedDocument],
    response: IngestResponse,
) -> Vec<SyncOutcome> {
    let mut by_id: HashMap<String, DocumentDetail> = HashMap::new();
    for detail in response.document_details {
        if let Some(custom) = &detail.identifier.custom {
            by_id.insert(custom.id.clone(), detail);
        }
    }

    documents
        .iter()
        .map(|doc| match by_id.remove(&doc.id) {
            Some(detail) => match IngestStatus::from_remote(&detail.status) {
                Some(status) => SyncOutcome {
                    document_id: doc.id.clone(),
                    status,
                    reason: detail.status_reason,
                },
                None => SyncOutcome::failed(
                    doc.id.clone(),
                    format!("unrecognized status '{}'", detail.status),
                ),
            },
            None => SyncOutcome::failed(doc.id.clone(), "no outcome returned"),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = IngestRequest {
            documents: documents.iter().map(document_payload).collect(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!("Ingest endpoint unavailable: HTTP {}", status);
            return Err(StorageError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Remote(format!("HTTP {}: {}", status, text)));
        }

        let parsed: IngestResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        debug!(
            "Ingest endpoint reported {} of {} documents",
            parsed.document_details.len(),
            documents.len()
        );

        Ok(collect_outcomes(documents, parsed))
    }
}
