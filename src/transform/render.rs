//! Flattens a parsed markup tree into markdown-like text
//!
//! Output is entity-encoded: literal text taken from CDATA sections and
//! attribute values is escaped so the final decoding pass restores it.

use super::markup::{Element, Node};
use super::text::escape_text;
use crate::assets::{resolve_fetch_url, OBJECT_URI_ATTRIBUTE};
use crate::model::Attachment;

/// Body-less macros rendered as a bracketed placeholder
const PLACEHOLDER_MACROS: &[&str] = &["toc", "children", "info", "note", "warning"];

/// Macros whose plain-text body is source code
const CODE_MACROS: &[&str] = &["code", "noformat"];

/// Page-level inputs needed to resolve links and asset references
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub page_id: &'a str,
    pub collection_key: &'a str,
    pub attachments: &'a [Attachment],
}

pub struct Renderer<'a> {
    base_url: &'a str,
    page: PageContext<'a>,
}

/// Makes a URL safe inside markdown link parentheses
fn link_target(url: &str) -> String {
    escape_text(&url.replace(' ', "%20").replace('(', "%28").replace(')', "%29"))
}

fn link(text: &str, url: &str) -> String {
    format!("[{}]({})", text, link_target(url))
}

fn image(alt: &str, url: &str) -> String {
    format!("![{}]({})", alt, link_target(url))
}

fn wrap_inline(marker: &str, inner: String) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        inner
    } else {
        format!("{}{}{}", marker, trimmed, marker)
    }
}

fn prefix_lines(block: &str, first: &str, rest: &str) -> String {
    let mut out = String::new();
    for (i, line) in block.trim().lines().enumerate() {
        out.push_str(if i == 0 { first } else { rest });
        out.push_str(line);
        out.push('\n');
    }
    out
}

impl<'a> Renderer<'a> {
    pub fn new(base_url: &'a str, page: PageContext<'a>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/'),
            page,
        }
    }

    pub fn render(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::CData(t) => out.push_str(&escape_text(t)),
                Node::Element(e) => out.push_str(&self.render_element(e)),
            }
        }
        out
    }

    fn render_element(&self, e: &Element) -> String {
        match e.name.as_str() {
            "ac:image" => self.render_image(e),
            "ac:link" => self.render_link(e),
            "ac:structured-macro" | "ac:macro" => self.render_macro(e),
            "ac:task-list" => self.render_tasks(e),
            "ac:emoticon" | "ac:parameter" | "ac:placeholder" | "colgroup" | "col" | "style"
            | "script" => String::new(),
            name if name.starts_with("ri:") => String::new(),

            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = e.name[1..].parse::<usize>().unwrap_or(1);
                format!(
                    "\n{} {}\n\n",
                    "#".repeat(level),
                    self.render(&e.children).trim()
                )
            }
            "p" => format!("{}\n\n", self.render(&e.children)),
            "br" => "\n".to_string(),
            "hr" => "\n---\n\n".to_string(),
            "ul" => self.render_list(e, false),
            "ol" => self.render_list(e, true),
            "li" => prefix_lines(&self.render(&e.children), "- ", "  "),
            "strong" | "b" => wrap_inline("**", self.render(&e.children)),
            "em" | "i" => wrap_inline("*", self.render(&e.children)),
            "s" | "del" => wrap_inline("~~", self.render(&e.children)),
            "code" => wrap_inline("`", self.render(&e.children)),
            "pre" => format!("\n```\n{}\n```\n\n", self.render(&e.children).trim_matches('\n')),
            "blockquote" => format!(
                "\n{}\n",
                prefix_lines(&self.render(&e.children), "> ", "> ")
            ),
            "table" => format!("\n{}\n", self.render(&e.children)),
            "tr" => self.render_row(e),
            "a" => {
                let text = self.render(&e.children);
                match e.attribute("href") {
                    Some(href) if !href.is_empty() => link(text.trim(), href),
                    _ => text,
                }
            }
            "img" => match e.attribute("src") {
                Some(src) => image(&escape_text(e.attribute("alt").unwrap_or("image")), src),
                None => String::new(),
            },
            "time" => e
                .attribute("datetime")
                .map(escape_text)
                .unwrap_or_else(|| self.render(&e.children)),
            _ => self.render(&e.children),
        }
    }

    fn render_list(&self, e: &Element, ordered: bool) -> String {
        let mut out = String::from("\n");
        let mut number = 0;
        for item in e.child_elements().filter(|c| c.name == "li") {
            number += 1;
            let marker = if ordered {
                format!("{}. ", number)
            } else {
                "- ".to_string()
            };
            let indent = " ".repeat(marker.len());
            out.push_str(&prefix_lines(&self.render(&item.children), &marker, &indent));
        }
        out.push('\n');
        out
    }

    fn render_row(&self, e: &Element) -> String {
        let cells: Vec<String> = e
            .child_elements()
            .filter(|c| c.name == "td" || c.name == "th")
            .map(|c| {
                self.render(&c.children)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        format!("{}\n", cells.join(" | "))
    }

    fn render_tasks(&self, e: &Element) -> String {
        let mut out = String::from("\n");
        for task in e.child_elements().filter(|c| c.name == "ac:task") {
            let done = task
                .child("ac:task-status")
                .map(|s| s.raw_text().trim() == "complete")
                .unwrap_or(false);
            let body = task
                .child("ac:task-body")
                .map(|b| self.render(&b.children))
                .unwrap_or_default();
            out.push_str(&format!(
                "- [{}] {}\n",
                if done { "x" } else { " " },
                body.trim()
            ));
        }
        out.push('\n');
        out
    }

    /// URL an attachment reference points at: relocated URI, else fetch URL
    fn attachment_url(&self, reference: &Element) -> Option<String> {
        if let Some(uri) = reference.attribute(OBJECT_URI_ATTRIBUTE) {
            return Some(uri.to_string());
        }
        let filename = reference.attribute("ri:filename")?;

        // References to another page's attachment cannot be resolved locally
        if reference.child("ri:page").is_some() || reference.child("ri:blog-post").is_some() {
            return None;
        }

        let download_link = self
            .page
            .attachments
            .iter()
            .find(|a| a.filename == filename)
            .and_then(|a| a.download_link.as_deref());
        Some(resolve_fetch_url(
            self.base_url,
            self.page.page_id,
            filename,
            download_link,
        ))
    }

    fn render_image(&self, e: &Element) -> String {
        if let Some(reference) = e.child("ri:attachment") {
            let filename = reference.attribute("ri:filename").unwrap_or("image");
            return match self.attachment_url(reference) {
                Some(url) => image(&escape_text(filename), &url),
                None => escape_text(filename),
            };
        }
        if let Some(external) = e.child("ri:url") {
            if let Some(url) = external.attribute("ri:value") {
                let alt = e.attribute("ac:alt").unwrap_or("image");
                return image(&escape_text(alt), url);
            }
        }
        String::new()
    }

    fn page_url(&self, title: &str, space_key: Option<&str>) -> String {
        format!(
            "{}/wiki/display/{}/{}",
            self.base_url,
            urlencoding::encode(space_key.unwrap_or(self.page.collection_key)),
            urlencoding::encode(title)
        )
    }

    fn render_link(&self, e: &Element) -> String {
        let label = e
            .child("ac:plain-text-link-body")
            .map(|b| b.raw_text())
            .or_else(|| e.child("ac:link-body").map(|b| self.render(&b.children)))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let (title, url) = if let Some(page) = e.child("ri:page") {
            let title = page.attribute("ri:content-title");
            let url = title.map(|t| self.page_url(t, page.attribute("ri:space-key")));
            (title.map(str::to_string), url)
        } else if let Some(reference) = e.child("ri:attachment") {
            (
                reference.attribute("ri:filename").map(str::to_string),
                self.attachment_url(reference),
            )
        } else if let Some(external) = e.child("ri:url") {
            (None, external.attribute("ri:value").map(str::to_string))
        } else if let Some(user) = e.child("ri:user") {
            (user.attribute("ri:username").map(str::to_string), None)
        } else {
            (None, None)
        };

        let text = label
            .or_else(|| title.map(|t| escape_text(&t)))
            .unwrap_or_else(|| "Link".to_string());

        match url {
            Some(url) => link(&text, &url),
            None => text,
        }
    }

    fn render_macro(&self, e: &Element) -> String {
        let name = e
            .attribute("ac:name")
            .unwrap_or_default()
            .to_ascii_lowercase();

        if CODE_MACROS.contains(&name.as_str()) {
            if let Some(body) = e.child("ac:plain-text-body") {
                let language = e
                    .child_elements()
                    .find(|p| p.name == "ac:parameter" && p.attribute("ac:name") == Some("language"))
                    .map(|p| p.raw_text())
                    .unwrap_or_default();
                return format!(
                    "\n```{}\n{}\n```\n\n",
                    language.trim(),
                    body.raw_text().trim_matches('\n')
                );
            }
        }

        if let Some(body) = e.child("ac:rich-text-body") {
            return self.render(&body.children);
        }
        if let Some(body) = e.child("ac:plain-text-body") {
            return body.raw_text();
        }
        if PLACEHOLDER_MACROS.contains(&name.as_str()) {
            return format!("\n[{}]\n", name.to_ascii_uppercase());
        }
        String::new()
    }
}
