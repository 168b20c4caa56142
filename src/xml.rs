//! Minimal WordprocessingML scanning.
//!
//! The document part is edited as text: elements are located with a regex over
//! their tags and a depth counter, so everything we do not touch is written
//! back exactly as it was read.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<(/?)([A-Za-z_][^\s/>]*)[^>]*>").unwrap();
    static ref CHAR_REF_RE: Regex = Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    Empty,
}

/// One start, end or empty-element tag.
#[derive(Debug, Clone, Copy)]
pub struct XmlTag<'a> {
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
    pub kind: TagKind,
}

/// Iterate over element tags of `xml` starting at byte offset `from`.
/// Comments, processing instructions and declarations are not reported.
pub fn tags_from(xml: &str, from: usize) -> impl Iterator<Item = XmlTag<'_>> {
    TAG_RE.captures_iter(&xml[from..]).map(move |caps| {
        let whole = caps.get(0).expect("match");
        let name = caps.get(2).expect("name");
        let kind = if !caps[1].is_empty() {
            TagKind::Close
        } else if whole.as_str().ends_with("/>") {
            TagKind::Empty
        } else {
            TagKind::Open
        };
        XmlTag {
            start: from + whole.start(),
            end: from + whole.end(),
            name: &xml[from + name.start()..from + name.end()],
            kind,
        }
    })
}

/// Byte offset just past the element whose start tag begins at `open_start`.
pub fn element_end(xml: &str, open_start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for tag in tags_from(xml, open_start) {
        match tag.kind {
            TagKind::Open => depth += 1,
            TagKind::Empty if depth == 0 => return Some(tag.end),
            TagKind::Empty => {}
            TagKind::Close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(tag.end);
                }
            }
        }
    }
    None
}

/// A direct child element of some container.
#[derive(Debug, Clone)]
pub struct Child<'a> {
    pub name: &'a str,
    pub range: Range<usize>,
}

/// Direct child elements inside `content` (a byte range of `xml` holding the
/// container's content, without its own start and end tags).
pub fn children<'a>(xml: &'a str, content: Range<usize>) -> Vec<Child<'a>> {
    let mut out = Vec::new();
    let mut pos = content.start;
    while pos < content.end {
        let Some(tag) = tags_from(&xml[..content.end], pos).next() else {
            break;
        };
        match tag.kind {
            TagKind::Close => break,
            TagKind::Empty => {
                out.push(Child {
                    name: tag.name,
                    range: tag.start..tag.end,
                });
                pos = tag.end;
            }
            TagKind::Open => {
                let Some(end) = element_end(&xml[..content.end], tag.start) else {
                    break;
                };
                out.push(Child {
                    name: tag.name,
                    range: tag.start..end,
                });
                pos = end;
            }
        }
    }
    out
}

/// Content range of the element occupying `element` in `xml` (between the end
/// of its start tag and the start of its end tag). Empty elements yield an
/// empty range at their end.
pub fn content_range(xml: &str, element: Range<usize>) -> Range<usize> {
    let open_end = match tags_from(xml, element.start).next() {
        Some(tag) if tag.kind == TagKind::Empty => return tag.end..tag.end,
        Some(tag) => tag.end,
        None => return element.end..element.end,
    };
    let close_start = xml[..element.end].rfind("</").unwrap_or(element.end);
    open_end..close_start.max(open_end)
}

/// Escape text content for use between tags. Control characters XML 1.0
/// cannot carry are dropped.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if c.is_control() && c < ' ' => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text for use inside a double-quoted attribute.
pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Resolve the predefined entities and numeric character references.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let text = CHAR_REF_RE.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
