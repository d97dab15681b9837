//! Structured run results

use crate::model::SyncOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Terminal status of a collection or a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Interrupted,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of syncing one collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub collection_key: String,
    pub status: ResultStatus,
    pub is_first_crawl: bool,
    /// Checkpoint read at the start of the run
    pub last_crawl: Option<DateTime<Utc>>,
    /// Run start time, the final checkpoint on completion
    pub current_crawl: DateTime<Utc>,
    /// Last checkpoint written during this run
    pub checkpoint: Option<DateTime<Utc>>,
    pub pages_found: usize,
    pub pages_changed: usize,
    pub pages_processed: usize,
    pub documents_ingested: usize,
    pub attachments_relocated: usize,
    pub failed_ingests: Vec<SyncOutcome>,
    pub page_errors: Vec<String>,
    pub attachment_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectionResult {
    pub fn new(collection_key: &str, current_crawl: DateTime<Utc>) -> Self {
        Self {
            collection_key: collection_key.to_string(),
            status: ResultStatus::Completed,
            is_first_crawl: true,
            last_crawl: None,
            current_crawl,
            checkpoint: None,
            pages_found: 0,
            pages_changed: 0,
            pages_processed: 0,
            documents_ingested: 0,
            attachments_relocated: 0,
            failed_ingests: Vec::new(),
            page_errors: Vec::new(),
            attachment_errors: Vec::new(),
            error: None,
        }
    }

    /// Marks the collection failed with a human-readable reason
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.status = ResultStatus::Error;
        self.error = Some(reason.into());
        self
    }

    /// Pages that produced no successfully ingested document
    pub fn pages_failed(&self) -> usize {
        self.page_errors.len() + self.failed_ingests.len()
    }
}

/// Result of one run across all collections
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: ResultStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collections: Vec<CollectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// Aggregates collection results; any error makes the run an error
    pub fn from_collections(
        collections: Vec<CollectionResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let status = if collections.iter().any(|c| c.status == ResultStatus::Error) {
            ResultStatus::Error
        } else if collections
            .iter()
            .any(|c| c.status == ResultStatus::Interrupted)
        {
            ResultStatus::Interrupted
        } else {
            ResultStatus::Completed
        };

        Self {
            status,
            started_at,
            finished_at,
            collections,
            error: None,
        }
    }

    /// A run that failed before any collection was processed
    pub fn failed(started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            started_at,
            finished_at: Utc::now(),
            collections: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn pages_processed(&self) -> usize {
        self.collections.iter().map(|c| c.pages_processed).sum()
    }

    pub fn documents_ingested(&self) -> usize {
        self.collections.iter().map(|c| c.documents_ingested).sum()
    }

    pub fn failed_ingests(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.collections.iter().flat_map(|c| c.failed_ingests.iter())
    }

    pub fn page_errors(&self) -> impl Iterator<Item = &String> {
        self.collections.iter().flat_map(|c| c.page_errors.iter())
    }

    pub fn attachment_errors(&self) -> impl Iterator<Item = &String> {
        self.collections
            .iter()
            .flat_map(|c| c.attachment_errors.iter())
    }
}
