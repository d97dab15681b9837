//! Data model shared by every stage of the sync pipeline
//!
//! # Components
//!
//! - `Page` / `Attachment`: records enumerated from the page source
//! - `TransformedDocument`: the canonical document upserted into the store
//! - `IngestStatus` / `SyncOutcome`: per-document upsert results

mod document;
mod outcome;
mod page;

pub use document::{document_id, AttributeValue, DocumentMetadata, TransformedDocument};
pub use outcome::{IngestStatus, SyncOutcome};
pub use page::{Attachment, Page};
