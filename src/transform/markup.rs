//! Tokenizer and tree parser for the wiki's XHTML storage format
//!
//! The tokenizer keeps byte spans so callers can edit the source in place.
//! The tree parser is strict: mismatched or unclosed tags are errors, and the
//! transformer falls back to plain text for such input.

use super::text::decode_entities;
use super::TransformError;
use std::ops::Range;

/// Elements that never have content or a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// An attribute as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute<'a> {
    pub name: &'a str,
    /// Value without quotes, still entity-encoded
    pub value: &'a str,
    /// False for bare boolean attributes
    pub has_value: bool,
}

/// An opening or self-closing tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    pub name: &'a str,
    pub attributes: Vec<RawAttribute<'a>>,
    pub span: Range<usize>,
    pub self_closing: bool,
}

impl<'a> Tag<'a> {
    pub fn attribute(&self, name: &str) -> Option<&RawAttribute<'a>> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Decoded value of an attribute
    pub fn attribute_value(&self, name: &str) -> Option<String> {
        self.attribute(name).map(|a| decode_entities(a.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Open(Tag<'a>),
    Close { name: &'a str, span: Range<usize> },
    /// Raw text, entity-encoded
    Text(&'a str),
    /// Literal CDATA contents
    CData(&'a str),
    /// Comments, declarations and processing instructions
    Ignored,
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b':' | b'-' | b'_' | b'.')
}

struct Tokenizer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn read_name(&mut self) -> &'a str {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_name_char(self.bytes[self.pos]) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Consumes up to and including `terminator`, returning the text before it
    fn read_until(&mut self, terminator: &str, start: usize) -> Result<&'a str, TransformError> {
        match self.src[self.pos..].find(terminator) {
            Some(i) => {
                let inner = &self.src[self.pos..self.pos + i];
                self.pos += i + terminator.len();
                Ok(inner)
            }
            None => Err(TransformError::Unterminated { offset: start }),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>, TransformError> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }

        let start = self.pos;
        if self.bytes[start] != b'<' {
            let end = self.src[start..]
                .find('<')
                .map(|i| start + i)
                .unwrap_or(self.bytes.len());
            self.pos = end;
            return Ok(Some(Token::Text(&self.src[start..end])));
        }

        let rest = &self.src[start..];
        if rest.starts_with("<!--") {
            self.pos += 4;
            self.read_until("-->", start)?;
            return Ok(Some(Token::Ignored));
        }
        if rest.starts_with("<![CDATA[") {
            self.pos += 9;
            let inner = self.read_until("]]>", start)?;
            return Ok(Some(Token::CData(inner)));
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            self.pos += 2;
            self.read_until(">", start)?;
            return Ok(Some(Token::Ignored));
        }

        match self.bytes.get(start + 1) {
            Some(b'/') => {
                self.pos += 2;
                let name = self.read_name();
                self.skip_whitespace();
                if name.is_empty() || self.bytes.get(self.pos) != Some(&b'>') {
                    return Err(TransformError::MalformedTag { offset: start });
                }
                self.pos += 1;
                Ok(Some(Token::Close {
                    name,
                    span: start..self.pos,
                }))
            }
            Some(c) if c.is_ascii_alphabetic() => {
                self.pos += 1;
                self.read_tag(start).map(|tag| Some(Token::Open(tag)))
            }
            _ => {
                // A lone `<` is text
                self.pos += 1;
                Ok(Some(Token::Text(&self.src[start..start + 1])))
            }
        }
    }

    fn read_tag(&mut self, start: usize) -> Result<Tag<'a>, TransformError> {
        let name = self.read_name();
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.bytes.get(self.pos) {
                None => return Err(TransformError::Unterminated { offset: start }),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(Tag {
                        name,
                        attributes,
                        span: start..self.pos,
                        self_closing: false,
                    });
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    return Ok(Tag {
                        name,
                        attributes,
                        span: start..self.pos,
                        self_closing: true,
                    });
                }
                Some(_) => attributes.push(self.read_attribute(start)?),
            }
        }
    }

    fn read_attribute(&mut self, start: usize) -> Result<RawAttribute<'a>, TransformError> {
        let name = self.read_name();
        if name.is_empty() {
            return Err(TransformError::MalformedTag { offset: start });
        }

        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'=') {
            // Boolean attribute
            return Ok(RawAttribute {
                name,
                value: "",
                has_value: false,
            });
        }
        self.pos += 1;
        self.skip_whitespace();

        match self.bytes.get(self.pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = self.pos + 1;
                let len = self.src[value_start..]
                    .find(quote as char)
                    .ok_or(TransformError::Unterminated { offset: start })?;
                self.pos = value_start + len + 1;
                Ok(RawAttribute {
                    name,
                    value: &self.src[value_start..value_start + len],
                    has_value: true,
                })
            }
            Some(_) => {
                let value_start = self.pos;
                while self.pos < self.bytes.len()
                    && !self.bytes[self.pos].is_ascii_whitespace()
                    && self.bytes[self.pos] != b'>'
                {
                    self.pos += 1;
                }
                Ok(RawAttribute {
                    name,
                    value: &self.src[value_start..self.pos],
                    has_value: true,
                })
            }
            None => Err(TransformError::Unterminated { offset: start }),
        }
    }
}

/// Splits markup into tokens
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, TransformError> {
    let mut tokenizer = Tokenizer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// A node of the parsed markup tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Entity-encoded text
    Text(String),
    /// Literal text from a CDATA section
    CData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lowercased tag name
    pub name: String,
    /// Attribute names lowercased, values decoded
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child element named `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of all descendants, CDATA included, not decoded
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::CData(t) => out.push_str(&super::text::escape_text(t)),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

fn element_from_tag(tag: &Tag<'_>) -> Element {
    Element {
        name: tag.name.to_ascii_lowercase(),
        attributes: tag
            .attributes
            .iter()
            .map(|a| (a.name.to_ascii_lowercase(), decode_entities(a.value)))
            .collect(),
        children: Vec::new(),
    }
}

/// Parses markup into a tree
pub fn parse(src: &str) -> Result<Vec<Node>, TransformError> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    fn push(root: &mut Vec<Node>, stack: &mut [Element], node: Node) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => root.push(node),
        }
    }

    for token in tokenize(src)? {
        match token {
            // Text nodes stay entity-encoded, so a lone `<` must be too
            Token::Text("<") => push(&mut root, &mut stack, Node::Text("&lt;".to_string())),
            Token::Text(t) => push(&mut root, &mut stack, Node::Text(t.to_string())),
            Token::CData(t) => push(&mut root, &mut stack, Node::CData(t.to_string())),
            Token::Ignored => {}
            Token::Open(tag) => {
                let element = element_from_tag(&tag);
                if tag.self_closing || is_void(&element.name) {
                    push(&mut root, &mut stack, Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Token::Close { name, span } => {
                let name = name.to_ascii_lowercase();
                if is_void(&name) {
                    continue;
                }
                match stack.pop() {
                    Some(element) if element.name == name => {
                        push(&mut root, &mut stack, Node::Element(element));
                    }
                    Some(element) => {
                        return Err(TransformError::Mismatched {
                            expected: element.name,
                            found: name,
                            offset: span.start,
                        })
                    }
                    None => {
                        return Err(TransformError::Mismatched {
                            expected: String::new(),
                            found: name,
                            offset: span.start,
                        })
                    }
                }
            }
        }
    }

    match stack.pop() {
        Some(element) => Err(TransformError::Unclosed(element.name)),
        None => Ok(root),
    }
}
