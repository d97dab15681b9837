//! Output module for run results
//!
//! This module handles:
//! - Structured per-collection and per-run results
//! - Console summaries of a run and of stored sync state
//! - JSON report export

mod result;
mod summary;

pub use result::{CollectionResult, ResultStatus, RunResult};
pub use summary::{print_status, print_summary, write_report};
