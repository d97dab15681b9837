//! In-memory parameter and document stores
//!
//! Used for dry runs and tests. Nothing survives the process.

use crate::model::{IngestStatus, SyncOutcome, TransformedDocument};
use crate::storage::traits::{DocumentStore, ParameterStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

fn poisoned() -> StorageError {
    StorageError::Database("in-memory store lock poisoned".to_string())
}

/// In-memory parameter store
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get_parameter(&self, name: &str) -> StorageResult<Option<String>> {
        Ok(self.values.lock().map_err(|_| poisoned())?.get(name).cloned())
    }

    async fn put_parameter(&self, name: &str, value: &str) -> StorageResult<()> {
        self.values
            .lock()
            .map_err(|_| poisoned())?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// In-memory document store keyed by document id
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, TransformedDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<TransformedDocument> {
        self.documents.lock().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns document ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        self.documents
            .lock()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>> {
        let mut stored = self.documents.lock().map_err(|_| poisoned())?;
        Ok(documents
            .iter()
            .map(|doc| {
                stored.insert(doc.id.clone(), doc.clone());
                SyncOutcome::new(doc.id.clone(), IngestStatus::Indexed)
            })
            .collect())
    }
}
