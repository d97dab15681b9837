//! Plain-text helpers: tag stripping, entity handling, blank-line collapsing

/// Escapes text so that `decode_entities` restores it exactly
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a value for use inside a double-quoted markup attribute
pub fn escape_attribute(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Decodes character references in one left-to-right pass
///
/// `&amp;lt;` therefore decodes to `&lt;`, not `<`. Unknown references are
/// left untouched. `&nbsp;` becomes a plain space.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .filter(|&semi| semi > 1 && semi <= 10)
            .and_then(|semi| decode_reference(&tail[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code).filter(|c| *c != '\0')
        }
    }
}

/// Removes everything that looks like a tag (`<` up to the next `>`)
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let tail = &rest[lt..];
        match tail[1..].find('>') {
            Some(gt) if gt > 0 => rest = &tail[gt + 2..],
            _ => {
                out.push('<');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Collapses runs of three or more line breaks (blank lines may contain
/// whitespace) into exactly one blank line
pub fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut lines = s.split('\n').peekable();
    let mut blank_run = 0;
    let mut first = true;

    while let Some(line) = lines.next() {
        let is_blank = line.trim().is_empty();
        let is_last = lines.peek().is_none();

        if is_blank && !is_last {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }

        if !first {
            out.push('\n');
        }
        first = false;
        if !is_blank {
            out.push_str(line);
        }
    }
    out
}

/// Strips tags, then decodes entities
pub fn to_plain_text(s: &str) -> String {
    decode_entities(&strip_tags(s))
}
