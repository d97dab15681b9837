//! Wiki-Sync: incremental wiki-to-knowledge-store synchronization
//!
//! This crate crawls a hierarchical wiki page tree collection by collection,
//! relocates embedded images into object storage, normalizes page markup into
//! retrievable text, and upserts the result into a document store under
//! stable identifiers. Progress is checkpointed per collection so an
//! interrupted run resumes instead of starting over.

pub mod assets;
pub mod config;
pub mod model;
pub mod output;
pub mod source;
pub mod state;
pub mod storage;
pub mod sync;
pub mod transform;

use thiserror::Error;

/// Main error type for Wiki-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Page source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Asset error: {0}")]
    Asset(#[from] assets::AssetError),

    #[error("Checkpoint store failed after {attempts} attempts: {source}")]
    Checkpoint {
        attempts: u32,
        source: storage::StorageError,
    },

    #[error("Malformed checkpoint state: {0}")]
    CheckpointFormat(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

/// Result type alias for Wiki-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{Attachment, IngestStatus, Page, SyncOutcome, TransformedDocument};
pub use output::{CollectionResult, RunResult};
pub use sync::SyncEngine;
