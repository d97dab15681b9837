//! Working-set selection and per-page checkpoint candidates

use crate::model::Page;
use chrono::{DateTime, Utc};

/// Pages to process for a collection, oldest-modified first
///
/// On a first run (`since` absent) every page is kept. Pages without a
/// modification time sort first; ties keep listing order.
pub fn select_pages(pages: Vec<Page>, since: Option<DateTime<Utc>>) -> Vec<Page> {
    let mut selected: Vec<Page> = match since {
        Some(since) => pages
            .into_iter()
            .filter(|p| p.has_changed_since(since))
            .collect(),
        None => pages,
    };
    selected.sort_by_key(|p| p.last_modified);
    selected
}

/// Checkpoint value to record once `pages[index]` has been ingested
///
/// Returns `None` when the page has no timestamp, or when the next page
/// shares its timestamp: advancing then would let a resume skip that page.
pub fn checkpoint_candidate(pages: &[Page], index: usize) -> Option<DateTime<Utc>> {
    let current = pages.get(index)?.last_modified?;
    match pages.get(index + 1).and_then(|next| next.last_modified) {
        Some(next) if next == current => None,
        _ => Some(current),
    }
}
