//! Storage module for the sync engine's external stores
//!
//! This module provides:
//! - SQLite database initialization and schema management
//! - Parameter stores holding checkpoint state
//! - Object stores receiving relocated attachments
//! - Document stores receiving transformed pages (local SQLite or remote HTTP)
//! - Run tracking

mod http_index;
mod memory;
mod object;
mod schema;
mod sqlite;
mod traits;

pub use http_index::HttpDocumentStore;
pub use memory::{MemoryDocumentStore, MemoryParameterStore};
pub use object::{FsObjectStore, MemoryObjectStore};
pub use sqlite::SqliteStorage;
pub use traits::{
    validate_object_key, DocumentStore, ObjectInfo, ObjectStore, ParameterStore, StorageError,
    StorageResult,
};

use crate::model::{DocumentMetadata, IngestStatus};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::new(path)
}

/// A document as held by the local index
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub body: String,
    pub metadata: DocumentMetadata,
    pub status: IngestStatus,
    pub updated_at: String,
}

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub summary: Option<String>,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
