//! In-place rewriting of attachment references
//!
//! A reference `<ri:attachment ri:filename="F" />` gains an
//! `ri:object-uri="U"` attribute. Matched tags are regenerated from their
//! parsed attributes with the URI attribute last, so applying the same
//! rewrite twice yields byte-identical output and a changed URI replaces the
//! old one. Everything outside matched tags is copied verbatim.

use super::OBJECT_URI_ATTRIBUTE;
use crate::transform::markup::{tokenize, Tag, Token};
use crate::transform::text::escape_attribute;
use crate::transform::TransformError;
use std::collections::BTreeSet;

const ATTACHMENT_TAG: &str = "ri:attachment";

/// Elements inside a reference that point it at another page
const FOREIGN_OWNERS: &[&str] = &["ri:page", "ri:blog-post", "ri:space"];

fn is_attachment(tag: &Tag<'_>) -> bool {
    tag.name.eq_ignore_ascii_case(ATTACHMENT_TAG)
}

/// True if the reference opened at `tokens[index]` names another page's attachment
fn is_foreign_reference(tokens: &[Token<'_>], index: usize) -> bool {
    for token in &tokens[index + 1..] {
        match token {
            Token::Close { name, .. } if name.eq_ignore_ascii_case(ATTACHMENT_TAG) => return false,
            Token::Open(tag)
                if FOREIGN_OWNERS
                    .iter()
                    .any(|owner| tag.name.eq_ignore_ascii_case(owner)) =>
            {
                return true
            }
            _ => {}
        }
    }
    false
}

/// Local attachment references with their decoded filenames
fn local_references<'t, 's>(tokens: &'t [Token<'s>]) -> Vec<(&'t Tag<'s>, String)> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| match token {
            Token::Open(tag) if is_attachment(tag) => {
                if !tag.self_closing && is_foreign_reference(tokens, i) {
                    return None;
                }
                let filename = tag.attribute_value("ri:filename")?;
                Some((tag, filename))
            }
            _ => None,
        })
        .collect()
}

/// Filenames of the attachments of this page referenced by the markup
pub fn referenced_filenames(content: &str) -> Result<BTreeSet<String>, TransformError> {
    let tokens = tokenize(content)?;
    Ok(local_references(&tokens)
        .into_iter()
        .map(|(_, filename)| filename)
        .collect())
}

fn render_tag(tag: &Tag<'_>, uri: &str) -> String {
    let mut out = format!("<{}", tag.name);
    for attribute in &tag.attributes {
        if attribute.name.eq_ignore_ascii_case(OBJECT_URI_ATTRIBUTE) {
            continue;
        }
        out.push(' ');
        out.push_str(attribute.name);
        if attribute.has_value {
            out.push_str("=\"");
            out.push_str(&attribute.value.replace('"', "&quot;"));
            out.push('"');
        }
    }
    out.push_str(&format!(" {}=\"{}\"", OBJECT_URI_ATTRIBUTE, escape_attribute(uri)));
    out.push_str(if tag.self_closing { " />" } else { ">" });
    out
}

/// Points every local reference to `filename` at `uri`
pub fn rewrite_references(
    content: &str,
    filename: &str,
    uri: &str,
) -> Result<String, TransformError> {
    let tokens = tokenize(content)?;
    let mut out = String::with_capacity(content.len() + uri.len());
    let mut copied = 0;

    for (tag, _) in local_references(&tokens)
        .into_iter()
        .filter(|(_, f)| f == filename)
    {
        out.push_str(&content[copied..tag.span.start]);
        out.push_str(&render_tag(tag, uri));
        copied = tag.span.end;
    }

    out.push_str(&content[copied..]);
    Ok(out)
}
