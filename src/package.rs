//! DOCX zip container: the ordered list of parts, plus the relationship and
//! content-type bookkeeping needed to embed new media.

use crate::error::{ResourceKind, Result, TemplateError};
use crate::xml::escape_attr;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

lazy_static! {
    static ref REL_ID_RE: Regex = Regex::new(r#"\bId="([^"]+)""#).unwrap();
}

/// Raw parts of a DOCX package in their original zip order.
#[derive(Debug, Clone, Default)]
pub struct Package {
    entries: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Read a DOCX zip into an ordered list of (entry_name, bytes).
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| TemplateError::from_open(ResourceKind::Document, path, e))?;
        Self::from_reader(file, path)
    }

    /// Read a package from any seekable source; `origin` is used in errors.
    pub fn from_reader<R: Read + Seek>(reader: R, origin: &Path) -> Result<Self> {
        let malformed = |e: zip::result::ZipError| {
            TemplateError::malformed(ResourceKind::Document, origin, e)
        };
        let mut archive = zip::ZipArchive::new(reader).map_err(malformed)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(malformed)?;
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| TemplateError::malformed(ResourceKind::Document, origin, e))?;
            entries.push((name, data));
        }
        Ok(Self { entries })
    }

    /// Write all parts back to a DOCX zip.
    /// Media files are STORED and everything else DEFLATED, matching the
    /// layout Word produces.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| TemplateError::io(path, e))?;
        self.write_to(file)
            .map_err(|e| TemplateError::io(path, std::io::Error::other(e)))
    }

    /// Serialize the package to an in-memory zip.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, zip::result::ZipError> {
        let mut buf = Cursor::new(Vec::new());
        self.write_to(&mut buf)?;
        Ok(buf.into_inner())
    }

    fn write_to<W: Write + Seek>(&self, writer: W) -> std::result::Result<(), zip::result::ZipError> {
        let mut zip = zip::ZipWriter::new(writer);
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in &self.entries {
            let opts = if name.starts_with("word/media/") {
                stored
            } else {
                deflated
            };
            zip.start_file(name.as_str(), opts)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn part_text(&self, name: &str) -> Option<String> {
        self.part(name)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    /// Replace a part, or append it when it does not exist yet.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Store image bytes as a new media part and register an image
    /// relationship for the main document. Returns the relationship id.
    pub fn add_image(&mut self, data: Vec<u8>, extension: &str, content_type: &str) -> String {
        let mut n = 1usize;
        let media_name = loop {
            let candidate = format!("word/media/image{}.{}", n, extension);
            if self.part(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        let target = media_name.trim_start_matches("word/").to_string();
        self.set_part(&media_name, data);

        let rels = self
            .part_text(DOCUMENT_RELS_PART)
            .unwrap_or_else(empty_relationships);
        let (rels, rel_id) = add_relationship(&rels, IMAGE_REL_TYPE, &target);
        self.set_part(DOCUMENT_RELS_PART, rels.into_bytes());

        let types = self.part_text(CONTENT_TYPES_PART).unwrap_or_default();
        let types = ensure_default_content_type(&types, extension, content_type);
        self.set_part(CONTENT_TYPES_PART, types.into_bytes());

        rel_id
    }
}

fn empty_relationships() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        "\n",
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
    )
    .to_string()
}

/// Append a relationship with a fresh `rIdN` id. Returns the new XML and the id.
fn add_relationship(rels_xml: &str, rel_type: &str, target: &str) -> (String, String) {
    let used: Vec<&str> = REL_ID_RE
        .captures_iter(rels_xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let mut n = used.len() + 1;
    while used.contains(&format!("rId{}", n).as_str()) {
        n += 1;
    }
    let id = format!("rId{}", n);
    let rel = format!(
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        id,
        rel_type,
        escape_attr(target)
    );
    let xml = match rels_xml.rfind("</Relationships>") {
        Some(pos) => {
            let mut out = rels_xml.to_string();
            out.insert_str(pos, &rel);
            out
        }
        None => format!("{}{}", rels_xml, rel),
    };
    (xml, id)
}

/// Make sure `[Content_Types].xml` has a `Default` entry for the extension.
fn ensure_default_content_type(types_xml: &str, extension: &str, content_type: &str) -> String {
    let needle = format!(r#"extension="{}""#, extension.to_lowercase());
    if types_xml.to_lowercase().contains(&needle) {
        return types_xml.to_string();
    }
    let default = format!(
        r#"<Default Extension="{}" ContentType="{}"/>"#,
        extension, content_type
    );
    match types_xml.rfind("</Types>") {
        Some(pos) => {
            let mut out = types_xml.to_string();
            out.insert_str(pos, &default);
            out
        }
        None => format!("{}{}", types_xml, default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_relationship_picks_unused_id() {
        let rels = r#"<Relationships><Relationship Id="rId1" Type="t" Target="styles.xml"/><Relationship Id="rId3" Type="t" Target="x"/></Relationships>"#;
        let (xml, id) = add_relationship(rels, IMAGE_REL_TYPE, "media/image1.png");
        assert_eq!(id, "rId4");
        assert!(xml.contains(r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/></Relationships>"#));
    }

    #[test]
    fn test_content_type_added_once() {
        let types = r#"<Types><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let once = ensure_default_content_type(types, "png", "image/png");
        assert!(once.contains(r#"<Default Extension="png" ContentType="image/png"/></Types>"#));
        let twice = ensure_default_content_type(&once, "png", "image/png");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_add_image_and_zip_round_trip() {
        let mut package = Package::default();
        package.set_part(CONTENT_TYPES_PART, b"<Types></Types>".to_vec());
        let rid = package.add_image(vec![1, 2, 3], "png", "image/png");
        assert_eq!(rid, "rId1");
        assert_eq!(package.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));
        let rid2 = package.add_image(vec![4], "png", "image/png");
        assert_eq!(rid2, "rId2");
        assert!(package.part("word/media/image2.png").is_some());

        let bytes = package.to_bytes().unwrap();
        let reopened = Package::from_reader(Cursor::new(bytes), Path::new("mem.docx")).unwrap();
        let names: Vec<&str> = reopened.part_names().collect();
        assert_eq!(
            names,
            vec![
                CONTENT_TYPES_PART,
                "word/media/image1.png",
                DOCUMENT_RELS_PART,
                "word/media/image2.png"
            ]
        );
    }

    #[test]
    fn test_open_missing_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.docx");
        assert!(matches!(
            Package::open(&missing),
            Err(TemplateError::NotFound {
                kind: ResourceKind::Document,
                ..
            })
        ));

        let garbage = dir.path().join("garbage.docx");
        std::fs::write(&garbage, b"not a zip").unwrap();
        assert!(matches!(
            Package::open(&garbage),
            Err(TemplateError::Malformed {
                kind: ResourceKind::Document,
                ..
            })
        ));
    }
}
