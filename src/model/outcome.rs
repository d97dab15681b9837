//! Per-document ingest outcome definitions
//!
//! The document store reports one status per submitted document; this module
//! maps those onto a closed enumeration and classifies success.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a document after an upsert call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    // ===== Success States =====
    /// The store accepted the document for processing
    Accepted,

    /// The document is queued behind other work
    Pending,

    /// The document is searchable
    Indexed,

    // ===== Failure States =====
    /// The store rejected the document
    Failed,

    /// The store dropped the document without indexing it
    Ignored,
}

impl IngestStatus {
    /// Returns true if the document counts as ingested
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted | Self::Pending | Self::Indexed)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Pending => "pending",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "pending" => Some(Self::Pending),
            "indexed" => Some(Self::Indexed),
            "failed" => Some(Self::Failed),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Maps a status string as reported by a remote document store
    ///
    /// Unknown strings yield `None`; callers treat them as failures.
    pub fn from_remote(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPTED" | "STARTING" => Some(Self::Accepted),
            "PENDING" | "IN_PROGRESS" => Some(Self::Pending),
            "INDEXED" => Some(Self::Indexed),
            "FAILED" | "NOT_FOUND" => Some(Self::Failed),
            "IGNORED" => Some(Self::Ignored),
            _ => None,
        }
    }

    /// Returns all statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Accepted,
            Self::Pending,
            Self::Indexed,
            Self::Failed,
            Self::Ignored,
        ]
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Outcome of upserting one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub document_id: String,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncOutcome {
    pub fn new(document_id: impl Into<String>, status: IngestStatus) -> Self {
        Self {
            document_id: document_id.into(),
            status,
            reason: None,
        }
    }

    pub fn failed(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            status: IngestStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
