//! Content transformer
//!
//! Converts a page's storage-format markup into normalized, retrievable text:
//!
//! 1. Parse the markup into a tree (asset references already rewritten by
//!    relocation carry their object URI and are passed through)
//! 2. Render links, macros, images and structural markup in one recursive
//!    pass (see `render`)
//! 3. Collapse runs of blank lines
//! 4. Strip surviving tags and decode entities
//!
//! Any parse failure falls back to step 4 applied to the raw input, so a page
//! always yields text.

pub mod markup;
mod render;
pub mod text;

pub use render::PageContext;

use render::Renderer;
use thiserror::Error;
use tracing::warn;

/// Errors raised while parsing page markup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Unterminated markup starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Malformed tag at byte {offset}")]
    MalformedTag { offset: usize },

    #[error("Expected </{expected}> but found </{found}> at byte {offset}")]
    Mismatched {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("Unclosed <{0}>")]
    Unclosed(String),
}

/// Stateless markup-to-text transformer
#[derive(Debug, Clone)]
pub struct ContentTransformer {
    base_url: String,
}

impl ContentTransformer {
    /// `base_url` is the wiki root used for page links and attachment URLs
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Transforms markup, falling back to plain text on malformed input
    pub fn transform(&self, raw: &str, page: PageContext<'_>) -> String {
        match self.try_transform(raw, page) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Markup of page {} could not be parsed ({}); using plain text",
                    page.page_id, e
                );
                text::to_plain_text(raw).trim().to_string()
            }
        }
    }

    /// Transforms markup without the plain-text fallback
    pub fn try_transform(&self, raw: &str, page: PageContext<'_>) -> Result<String, TransformError> {
        let nodes = markup::parse(raw)?;
        let rendered = Renderer::new(&self.base_url, page).render(&nodes);
        let collapsed = text::collapse_blank_lines(&rendered);
        Ok(text::to_plain_text(&collapsed).trim().to_string())
    }
}
