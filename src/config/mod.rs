//! Configuration module for Wiki-Sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The configuration is validated once at startup and then passed by reference
//! into every component.
//!
//! # Example
//!
//! ```no_run
//! use wiki_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("wiki-sync.toml")).unwrap();
//! println!("Collections: {:?}", config.source.collections);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AttachmentsTarget, CheckpointConfig, Config, IndexConfig, IndexKind, ObjectStorageConfig,
    SourceConfig, StorageClass, SyncConfig, DEFAULT_MAX_ATTACHMENT_BYTES,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
