//! Storage traits and error types
//!
//! This module defines the trait interfaces for the three external stores the
//! sync engine talks to, and the error type they share. Every implementation
//! must be safe to share between collection workers.

use crate::config::StorageClass;
use crate::model::{SyncOutcome, TransformedDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Store temporarily unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns true for failures worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Io(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key-value parameter store holding the checkpoint state
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Reads a parameter, `None` when it was never written
    async fn get_parameter(&self, name: &str) -> StorageResult<Option<String>>;

    /// Writes a parameter, replacing any previous value
    async fn put_parameter(&self, name: &str, value: &str) -> StorageResult<()>;
}

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub storage_class: StorageClass,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Durable object storage for relocated attachments
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `bucket`/`key`, overwriting any existing object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        storage_class: StorageClass,
    ) -> StorageResult<()>;

    /// Reads an object, `None` if it does not exist
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Reads object metadata, `None` if it does not exist
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectInfo>>;

    /// Lists keys starting with `prefix`, sorted
    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>>;

    /// Deletes an object, returning whether it existed
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<bool>;
}

/// Searchable document store accepting batch upserts
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces documents keyed by their identifier
    ///
    /// Returns one outcome per submitted document. An `Err` means the call
    /// itself failed and no outcome is known for any document.
    async fn upsert(&self, documents: &[TransformedDocument]) -> StorageResult<Vec<SyncOutcome>>;
}

/// Rejects keys that could escape their bucket
pub fn validate_object_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
