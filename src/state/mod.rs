//! State module for tracking sync progress
//!
//! # Components
//!
//! - `CrawlStateTracker`: persists per-collection checkpoints with retry
//! - `CrawlCheckpoint`: one collection's stored progress
//! - `CancellationFlag`: cooperative stop request checked at page boundaries

mod cancel;
mod checkpoint;

pub use cancel::CancellationFlag;
pub use checkpoint::{CrawlCheckpoint, CrawlStateTracker};
