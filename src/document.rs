//! Owned model of a DOCX main document.
//!
//! The body of `word/document.xml` is split into top-level blocks. Paragraphs
//! are further split into runs; everything else is kept as opaque markup.
//! Blocks and runs that are never modified are written back exactly as read.

use crate::error::{ResourceKind, Result, TemplateError};
use crate::package::{Package, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART};
use crate::xml::{self, TagKind};
use image::ImageFormat;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;

const EMU_PER_INCH: f64 = 914_400.0;
/// Usable text width of a Letter/A4 page with 1" margins, in twentieths of a point.
const TABLE_TEXT_WIDTH: usize = 9_360;

lazy_static! {
    static ref DRAWING_ID_RE: Regex =
        Regex::new(r#"<(?:wp:docPr|pic:cNvPr)\b[^>]*?\bid="(\d+)""#).unwrap();
}

// ─── Runs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum RunPart {
    Markup(String),
    /// A `<w:t>` element: its start tag and its unescaped text.
    Text { open: String, text: String },
    /// `<w:tab/>`, `<w:br/>` or `<w:cr/>`: fixed markup read as one character.
    Break { markup: String, ch: char },
}

/// Character a run-level break element stands for in the run text.
fn break_char(name: &str) -> Option<char> {
    match name {
        "w:tab" => Some('\t'),
        "w:br" | "w:cr" => Some('\n'),
        _ => None,
    }
}

/// A `<w:r>` element: a span of text sharing one formatting context.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    parts: Vec<RunPart>,
    raw: Option<String>,
}

impl Run {
    /// A plain run with no formatting properties.
    pub fn new(text: &str) -> Self {
        Self {
            parts: vec![
                RunPart::Markup("<w:r>".to_string()),
                RunPart::Text {
                    open: "<w:t>".to_string(),
                    text: text.to_string(),
                },
                RunPart::Markup("</w:r>".to_string()),
            ],
            raw: None,
        }
    }

    /// Parse a complete `<w:r>...</w:r>` element. The last part is always the
    /// run's own end tag.
    pub(crate) fn parse(run_xml: &str) -> Self {
        let raw = Some(run_xml.to_string());
        if run_xml.ends_with("/>") {
            let open = format!("{}>", run_xml.trim_end_matches("/>").trim_end());
            return Self {
                parts: vec![RunPart::Markup(open), RunPart::Markup("</w:r>".to_string())],
                raw,
            };
        }
        let content = xml::content_range(run_xml, 0..run_xml.len());
        let mut parts = Vec::new();
        let mut markup_start = 0;
        for child in xml::children(run_xml, content.clone()) {
            let element = &run_xml[child.range.clone()];
            let part = if let Some(ch) = break_char(child.name) {
                RunPart::Break {
                    markup: element.to_string(),
                    ch,
                }
            } else if child.name == "w:t" && !element.ends_with("/>") {
                let inner = xml::content_range(run_xml, child.range.clone());
                RunPart::Text {
                    open: run_xml[child.range.start..inner.start].to_string(),
                    text: xml::unescape(&run_xml[inner]),
                }
            } else {
                continue;
            };
            parts.push(RunPart::Markup(run_xml[markup_start..child.range.start].to_string()));
            parts.push(part);
            markup_start = child.range.end;
        }
        parts.push(RunPart::Markup(run_xml[markup_start..content.end].to_string()));
        parts.push(RunPart::Markup(run_xml[content.end..].to_string()));
        Self { parts, raw }
    }

    /// Text of the run: its `<w:t>` elements, with `\t` for tabs and `\n`
    /// for line breaks.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                RunPart::Text { text, .. } => Some(text.clone()),
                RunPart::Break { ch, .. } => Some(ch.to_string()),
                RunPart::Markup(_) => None,
            })
            .collect()
    }

    /// Replace the run's text, keeping its formatting, tabs and breaks. When
    /// the run holds several `<w:t>` elements the first one receives all of
    /// the text.
    pub fn set_text(&mut self, new_text: &str) {
        self.raw = None;
        let mut first = true;
        for part in &mut self.parts {
            if let RunPart::Text { text, .. } = part {
                if first {
                    *text = new_text.to_string();
                    first = false;
                } else {
                    text.clear();
                }
            }
        }
        if first {
            // before the run's end tag
            let at = self.parts.len().saturating_sub(1);
            self.parts.insert(
                at,
                RunPart::Text {
                    open: "<w:t>".to_string(),
                    text: new_text.to_string(),
                },
            );
        }
    }

    /// Replace every occurrence of `token` in this run with `value`.
    /// Returns the number of occurrences replaced.
    pub fn replace(&mut self, token: &str, value: &str) -> usize {
        replace_in_runs(&mut [&mut *self], token, value)
    }

    pub fn to_xml(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut out = String::new();
        for part in &self.parts {
            match part {
                RunPart::Markup(markup) | RunPart::Break { markup, .. } => out.push_str(markup),
                RunPart::Text { open, text } => {
                    out.push_str(&text_open_tag(open, text));
                    out.push_str(&xml::escape_text(text));
                    out.push_str("</w:t>");
                }
            }
        }
        out
    }
}

/// Word drops leading and trailing spaces unless the element asks to keep them.
fn text_open_tag(open: &str, text: &str) -> String {
    let needs_preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    if needs_preserve && !open.contains("xml:space") {
        let bare = open.trim_end_matches('>');
        format!(r#"{} xml:space="preserve">"#, bare)
    } else {
        open.to_string()
    }
}

/// Replace every occurrence of `search` in the combined text of `runs`.
/// Matched characters are removed from the `<w:t>` elements holding them and
/// the replacement goes where the match starts. Tabs and breaks never move:
/// an occurrence that covers one is left as it is.
fn replace_in_runs(runs: &mut [&mut Run], search: &str, replacement: &str) -> usize {
    if search.is_empty() {
        return 0;
    }

    // Combined text, with the text slot owning each char (None for breaks)
    let mut slots: Vec<(usize, usize)> = Vec::new();
    let mut chars: Vec<char> = Vec::new();
    let mut owner: Vec<Option<usize>> = Vec::new();
    for (r, run) in runs.iter().enumerate() {
        for (p, part) in run.parts.iter().enumerate() {
            match part {
                RunPart::Text { text, .. } => {
                    for ch in text.chars() {
                        chars.push(ch);
                        owner.push(Some(slots.len()));
                    }
                    slots.push((r, p));
                }
                RunPart::Break { ch, .. } => {
                    chars.push(*ch);
                    owner.push(None);
                }
                RunPart::Markup(_) => {}
            }
        }
    }

    // Search on chars rather than bytes so offsets stay aligned with `owner`
    let needle: Vec<char> = search.chars().collect();
    let mut matches: Vec<usize> = Vec::new();
    let mut pos = 0;
    while pos + needle.len() <= chars.len() {
        let window = pos..pos + needle.len();
        if chars[window.clone()] == needle[..] && owner[window].iter().all(Option::is_some) {
            matches.push(pos);
            pos += needle.len();
        } else {
            pos += 1;
        }
    }
    if matches.is_empty() {
        return 0;
    }

    let mut new_texts = vec![String::new(); slots.len()];
    let mut next_match = matches.iter().peekable();
    let mut i = 0;
    while i < chars.len() {
        if next_match.peek() == Some(&&i) {
            next_match.next();
            if let Some(slot) = owner[i] {
                new_texts[slot].push_str(replacement);
            }
            i += needle.len();
        } else {
            if let Some(slot) = owner[i] {
                new_texts[slot].push(chars[i]);
            }
            i += 1;
        }
    }

    for ((r, p), new) in slots.into_iter().zip(new_texts) {
        let run = &mut *runs[r];
        if let RunPart::Text { text, .. } = &mut run.parts[p] {
            if *text != new {
                *text = new;
                run.raw = None;
            }
        }
    }
    matches.len()
}

// ─── Paragraphs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Markup(String),
    Run(Run),
}

/// A `<w:p>` element: runs interleaved with paragraph-level markup
/// (properties, bookmarks, hyperlink wrappers, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    segments: Vec<Segment>,
    raw: Option<String>,
}

impl Paragraph {
    /// A paragraph holding one plain run (no run when `text` is empty).
    pub fn new(text: &str) -> Self {
        let mut segments = vec![Segment::Markup("<w:p>".to_string())];
        if !text.is_empty() {
            segments.push(Segment::Run(Run::new(text)));
        }
        segments.push(Segment::Markup("</w:p>".to_string()));
        Self {
            segments,
            raw: None,
        }
    }

    /// Parse a complete `<w:p>` element. Runs nested inside hyperlinks,
    /// smart tags or tracked insertions belong to the paragraph too. The last
    /// segment is always the paragraph's own end tag.
    pub(crate) fn parse(p_xml: &str) -> Self {
        let raw = Some(p_xml.to_string());
        if p_xml.ends_with("/>") {
            let open = format!("{}>", p_xml.trim_end_matches("/>").trim_end());
            return Self {
                segments: vec![Segment::Markup(open), Segment::Markup("</w:p>".to_string())],
                raw,
            };
        }
        let content = xml::content_range(p_xml, 0..p_xml.len());
        let scope = &p_xml[..content.end];
        let mut segments = Vec::new();
        let mut markup_start = 0;
        let mut pos = content.start;
        while let Some(tag) =
            xml::tags_from(scope, pos).find(|t| t.kind == TagKind::Open && t.name == "w:r")
        {
            let Some(end) = xml::element_end(scope, tag.start) else {
                break;
            };
            segments.push(Segment::Markup(p_xml[markup_start..tag.start].to_string()));
            segments.push(Segment::Run(Run::parse(&p_xml[tag.start..end])));
            markup_start = end;
            pos = end;
        }
        segments.push(Segment::Markup(p_xml[markup_start..content.end].to_string()));
        segments.push(Segment::Markup(p_xml[content.end..].to_string()));
        Self { segments, raw }
    }

    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs().map(|run| run.text()).collect()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Run(run) => Some(run),
            Segment::Markup(_) => None,
        })
    }

    pub fn runs_mut(&mut self) -> impl Iterator<Item = &mut Run> {
        self.raw = None;
        self.segments.iter_mut().filter_map(|segment| match segment {
            Segment::Run(run) => Some(run),
            Segment::Markup(_) => None,
        })
    }

    /// Append a run at the end of the paragraph, outside any hyperlink or
    /// other wrapper.
    pub fn push_run(&mut self, run: Run) {
        self.raw = None;
        let at = self.segments.len().saturating_sub(1);
        self.segments.insert(at, Segment::Run(run));
    }

    /// Replace every occurrence of `search` in the paragraph text, including
    /// occurrences split across runs. Matched characters are removed from the
    /// runs holding them and the replacement goes into the run where the match
    /// starts; no run is added, merged or removed.
    /// Returns the number of occurrences replaced.
    pub fn replace_text(&mut self, search: &str, replacement: &str) -> usize {
        let mut runs: Vec<&mut Run> = self.runs_mut().collect();
        replace_in_runs(&mut runs, search, replacement)
    }

    pub fn to_xml(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Markup(markup) => markup.clone(),
                Segment::Run(run) => run.to_xml(),
            })
            .collect()
    }
}

// ─── Tables ─────────────────────────────────────────────────────────────────

/// A `<w:tbl>` element as a grid of cell texts.
///
/// Tables read from a document keep their original markup until a cell is
/// changed; tables built with [`Table::new`] are rendered with single borders,
/// an equal-width grid and bold repeating header rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    rows: Vec<Vec<String>>,
    header_rows: usize,
    raw: Option<String>,
}

impl Table {
    /// An empty table of `rows` x `columns` cells.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows: vec![vec![String::new(); columns]; rows],
            header_rows: 0,
            raw: None,
        }
    }

    pub(crate) fn parse(tbl_xml: &str) -> Self {
        let content = xml::content_range(tbl_xml, 0..tbl_xml.len());
        let rows: Vec<Vec<String>> = xml::children(tbl_xml, content)
            .into_iter()
            .filter(|child| child.name == "w:tr")
            .map(|tr| {
                let tr_content = xml::content_range(tbl_xml, tr.range);
                xml::children(tbl_xml, tr_content)
                    .into_iter()
                    .filter(|child| child.name == "w:tc")
                    .map(|tc| {
                        let tc_content = xml::content_range(tbl_xml, tc.range);
                        xml::children(tbl_xml, tc_content)
                            .into_iter()
                            .filter(|child| child.name == "w:p")
                            .map(|p| Paragraph::parse(&tbl_xml[p.range]).text())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .collect::<Vec<String>>()
            })
            .collect();
        Self {
            rows,
            header_rows: 0,
            raw: Some(tbl_xml.to_string()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Set a cell's text. Out-of-range coordinates are ignored.
    pub fn set_cell(&mut self, row: usize, column: usize, text: &str) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = text.to_string();
            self.raw = None;
        }
    }

    /// Mark the first `n` rows as header rows (bold, repeated on each page).
    pub fn set_header_rows(&mut self, n: usize) {
        self.header_rows = n;
        self.raw = None;
    }

    pub fn to_xml(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let columns = self.column_count().max(1);
        let col_width = TABLE_TEXT_WIDTH / columns;

        let mut out = String::from("<w:tbl><w:tblPr><w:tblW w:w=\"0\" w:type=\"auto\"/><w:tblBorders>");
        for side in ["top", "left", "bottom", "right", "insideH", "insideV"] {
            out.push_str(&format!(
                r#"<w:{} w:val="single" w:sz="4" w:space="0" w:color="auto"/>"#,
                side
            ));
        }
        out.push_str(r#"</w:tblBorders><w:tblLook w:val="04A0" w:firstRow="1" w:lastRow="0" w:firstColumn="1" w:lastColumn="0" w:noHBand="0" w:noVBand="1"/></w:tblPr><w:tblGrid>"#);
        for _ in 0..columns {
            out.push_str(&format!(r#"<w:gridCol w:w="{}"/>"#, col_width));
        }
        out.push_str("</w:tblGrid>");

        for (r, row) in self.rows.iter().enumerate() {
            let header = r < self.header_rows;
            out.push_str("<w:tr>");
            if header {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for c in 0..columns {
                let text = row.get(c).map(String::as_str).unwrap_or("");
                out.push_str(&format!(
                    r#"<w:tc><w:tcPr><w:tcW w:w="{}" w:type="dxa"/></w:tcPr><w:p>"#,
                    col_width
                ));
                if !text.is_empty() {
                    out.push_str("<w:r>");
                    if header {
                        out.push_str("<w:rPr><w:b/></w:rPr>");
                    }
                    out.push_str(&format!(
                        "{}{}</w:t>",
                        text_open_tag("<w:t>", text),
                        xml::escape_text(text)
                    ));
                    out.push_str("</w:r>");
                }
                out.push_str("</w:p></w:tc>");
            }
            out.push_str("</w:tr>");
        }
        out.push_str("</w:tbl>");
        out
    }
}

// ─── Pictures ───────────────────────────────────────────────────────────────

/// Image bytes with their detected format and pixel size.
#[derive(Debug, Clone)]
pub struct Picture {
    data: Vec<u8>,
    extension: &'static str,
    content_type: &'static str,
    width_px: u32,
    height_px: u32,
}

impl Picture {
    /// Detect the image format from its content. The error is a human-readable
    /// reason the bytes cannot be embedded.
    pub fn from_bytes(data: Vec<u8>) -> std::result::Result<Self, String> {
        let reader = image::ImageReader::new(Cursor::new(data.as_slice()))
            .with_guessed_format()
            .map_err(|e| e.to_string())?;
        let format = reader
            .format()
            .ok_or_else(|| "unrecognized image format".to_string())?;
        let (extension, content_type) = match format {
            ImageFormat::Png => ("png", "image/png"),
            ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
            ImageFormat::Gif => ("gif", "image/gif"),
            ImageFormat::Bmp => ("bmp", "image/bmp"),
            ImageFormat::Tiff => ("tiff", "image/tiff"),
            other => return Err(format!("unsupported image format {:?}", other)),
        };
        let (width_px, height_px) = reader.into_dimensions().map_err(|e| e.to_string())?;
        if width_px == 0 || height_px == 0 {
            return Err("image has no pixels".to_string());
        }
        Ok(Self {
            data,
            extension,
            content_type,
            width_px,
            height_px,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    /// Display size in EMU for the given width, keeping the aspect ratio.
    fn extent(&self, width_inches: f64) -> (u64, u64) {
        let cx = (width_inches * EMU_PER_INCH).round().max(1.0) as u64;
        let cy = (cx as f64 * self.height_px as f64 / self.width_px as f64).round() as u64;
        (cx, cy.max(1))
    }
}

fn inline_picture_run(rel_id: &str, drawing_id: u32, cx: u64, cy: u64) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing>"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rid}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = cx,
        cy = cy,
        id = drawing_id,
        rid = rel_id,
    )
}

// ─── Document ───────────────────────────────────────────────────────────────

/// A top-level element of the document body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    /// Any other body element (content controls, bookmarks, ...), verbatim.
    Other(String),
}

impl Block {
    fn to_xml(&self) -> String {
        match self {
            Block::Paragraph(p) => p.to_xml(),
            Block::Table(t) => t.to_xml(),
            Block::Other(markup) => markup.clone(),
        }
    }
}

/// A DOCX document: its package plus the parsed body of the main part.
#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    /// Everything up to and including `<w:body>`
    head: String,
    blocks: Vec<Block>,
    /// Trailing `<w:sectPr>`, kept after every appended block
    section: Option<String>,
    /// `</w:body>` and the rest of the part
    tail: String,
    next_drawing_id: u32,
}

impl Document {
    /// An empty document with a single A4 section.
    pub fn new() -> Self {
        let mut package = Package::default();
        package.set_part(
            CONTENT_TYPES_PART,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                r#"</Types>"#
            )
            .as_bytes()
            .to_vec(),
        );
        package.set_part(
            "_rels/.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
                r#"</Relationships>"#
            )
            .as_bytes()
            .to_vec(),
        );
        package.set_part(
            DOCUMENT_RELS_PART,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
            )
            .as_bytes()
            .to_vec(),
        );

        Self {
            package,
            head: concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
                r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
                r#"<w:body>"#
            )
            .to_string(),
            blocks: Vec::new(),
            section: Some(
                r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr>"#
                    .to_string(),
            ),
            tail: "</w:body></w:document>".to_string(),
            next_drawing_id: 1,
        }
    }

    /// Open a DOCX file.
    pub fn open(path: &Path) -> Result<Self> {
        let package = Package::open(path)?;
        Self::from_package(package, path)
    }

    /// Build a document from an opened package; `origin` is used in errors.
    pub fn from_package(package: Package, origin: &Path) -> Result<Self> {
        let doc_xml = package.part_text(DOCUMENT_PART).ok_or_else(|| {
            TemplateError::malformed(ResourceKind::Document, origin, "no word/document.xml part")
        })?;

        let body_start = xml::tags_from(&doc_xml, 0)
            .find(|t| t.name == "w:body" && t.kind != TagKind::Close)
            .ok_or_else(|| {
                TemplateError::malformed(ResourceKind::Document, origin, "no <w:body> element")
            })?;
        let body_end = xml::element_end(&doc_xml, body_start.start).ok_or_else(|| {
            TemplateError::malformed(ResourceKind::Document, origin, "unterminated <w:body>")
        })?;
        let content = xml::content_range(&doc_xml, body_start.start..body_end);

        let mut blocks = Vec::new();
        let mut section = None;
        let children = xml::children(&doc_xml, content.clone());
        let last = children.len().saturating_sub(1);
        for (i, child) in children.iter().enumerate() {
            let element = &doc_xml[child.range.clone()];
            match child.name {
                "w:p" => blocks.push(Block::Paragraph(Paragraph::parse(element))),
                "w:tbl" => blocks.push(Block::Table(Table::parse(element))),
                "w:sectPr" if i == last => section = Some(element.to_string()),
                _ => blocks.push(Block::Other(element.to_string())),
            }
        }

        let next_drawing_id = DRAWING_ID_RE
            .captures_iter(&doc_xml)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        log::debug!(
            "Parsed {}: {} body blocks",
            origin.display(),
            blocks.len()
        );

        Ok(Self {
            head: doc_xml[..content.start].to_string(),
            tail: doc_xml[content.end..].to_string(),
            package,
            blocks,
            section,
            next_drawing_id,
        })
    }

    /// Write the document to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_package().save(path)
    }

    /// The package with the main part re-serialized from the model.
    pub fn to_package(&self) -> Package {
        let mut package = self.package.clone();
        package.set_part(DOCUMENT_PART, self.to_document_xml().into_bytes());
        package
    }

    /// Serialized `word/document.xml`.
    pub fn to_document_xml(&self) -> String {
        let mut out = self.head.clone();
        for block in &self.blocks {
            out.push_str(&block.to_xml());
        }
        if let Some(section) = &self.section {
            out.push_str(section);
        }
        out.push_str(&self.tail);
        out
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.blocks.iter_mut().filter_map(|block| match block {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    /// Text of every body paragraph, in document order.
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraphs().map(Paragraph::text).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Block index of the first paragraph whose text contains `needle`.
    pub fn find_paragraph(&self, needle: &str) -> Option<usize> {
        self.blocks.iter().position(|block| match block {
            Block::Paragraph(p) => p.text().contains(needle),
            _ => false,
        })
    }

    /// The paragraph at block index `index`, if that block is a paragraph.
    pub fn paragraph_mut(&mut self, index: usize) -> Option<&mut Paragraph> {
        match self.blocks.get_mut(index) {
            Some(Block::Paragraph(p)) => Some(p),
            _ => None,
        }
    }

    /// Insert `block` immediately after the block at `index`.
    pub fn insert_after(&mut self, index: usize, block: Block) {
        let at = (index + 1).min(self.blocks.len());
        self.blocks.insert(at, block);
    }

    pub fn append_paragraph(&mut self, paragraph: Paragraph) {
        self.blocks.push(Block::Paragraph(paragraph));
    }

    pub fn append_table(&mut self, table: Table) {
        self.blocks.push(Block::Table(table));
    }

    /// Embed `picture` in the package and return an inline run showing it at
    /// `width_inches`.
    pub fn picture_run(&mut self, picture: Picture, width_inches: f64) -> Run {
        let (cx, cy) = picture.extent(width_inches);
        let rel_id = self
            .package
            .add_image(picture.data, picture.extension, picture.content_type);
        let drawing_id = self.next_drawing_id;
        self.next_drawing_id += 1;
        Run::parse(&inline_picture_run(&rel_id, drawing_id, cx, cy))
    }

    /// Append a paragraph holding only `picture`.
    pub fn append_picture(&mut self, picture: Picture, width_inches: f64) {
        let run = self.picture_run(picture, width_inches);
        let mut paragraph = Paragraph::new("");
        paragraph.push_run(run);
        self.append_paragraph(paragraph);
    }

    pub fn package(&self) -> &Package {
        &self.package
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
