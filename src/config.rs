//! Configuration for tabular sources and document rewriting.

use crate::error::{Result, TemplateError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Character encoding of a delimited text source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte is the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Decode raw bytes into text. Returns `None` when the bytes are not
    /// valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                String::from_utf8(bytes.to_vec()).ok()
            }
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encode text for writing. Fails on characters Latin-1 cannot represent.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch)).map_err(|_| {
                        TemplateError::InvalidArgument(format!(
                            "character '{}' cannot be written as latin-1",
                            ch
                        ))
                    })
                })
                .collect(),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(TextEncoding::Latin1),
            other => Err(TemplateError::InvalidArgument(format!(
                "unsupported encoding '{}' (expected utf-8 or latin-1)",
                other
            ))),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
            TextEncoding::Latin1 => f.write_str("latin-1"),
        }
    }
}

/// Field separator and encoding used to read and write delimited files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularConfig {
    pub separator: u8,
    pub encoding: TextEncoding,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self::comma_utf8()
    }
}

impl TabularConfig {
    /// Comma separated, UTF-8
    pub fn comma_utf8() -> Self {
        Self {
            separator: b',',
            encoding: TextEncoding::Utf8,
        }
    }

    /// Semicolon separated, Latin-1 (spreadsheet exports from pt-BR locales)
    pub fn semicolon_latin1() -> Self {
        Self {
            separator: b';',
            encoding: TextEncoding::Latin1,
        }
    }

    /// Build a profile from a separator character and an encoding name.
    pub fn new(separator: char, encoding: &str) -> Result<Self> {
        let separator = u8::try_from(u32::from(separator))
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                TemplateError::InvalidArgument(format!(
                    "separator '{}' must be a single ASCII character",
                    separator
                ))
            })?;
        Ok(Self {
            separator,
            encoding: encoding.parse()?,
        })
    }
}

/// Options applied while resolving a tag map into a document.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// Display width of inserted images, in inches. Height keeps the aspect ratio.
    pub image_width_inches: f64,
    /// Profile used to read the CSV referenced by table tags.
    pub tabular: TabularConfig,
    /// Directory relative image and table paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            image_width_inches: 6.0,
            tabular: TabularConfig::default(),
            base_dir: None,
        }
    }
}

impl RewriteOptions {
    /// Resolve a path taken from a tag value against `base_dir`.
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = TabularConfig::default();
        assert_eq!(default.separator, b',');
        assert_eq!(default.encoding, TextEncoding::Utf8);

        let br = TabularConfig::semicolon_latin1();
        assert_eq!(br.separator, b';');
        assert_eq!(br.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn test_new_rejects_non_ascii_separator() {
        assert!(TabularConfig::new(';', "latin1").is_ok());
        assert!(matches!(
            TabularConfig::new('§', "utf-8"),
            Err(TemplateError::InvalidArgument(_))
        ));
        assert!(matches!(
            TabularConfig::new(',', "ebcdic"),
            Err(TemplateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_latin1_decode_and_encode() {
        let bytes = [0x4Du8, 0xEA, 0x73]; // "Mês"
        let text = TextEncoding::Latin1.decode(&bytes).unwrap();
        assert_eq!(text, "Mês");
        assert_eq!(TextEncoding::Latin1.encode(&text).unwrap(), bytes.to_vec());
        assert!(TextEncoding::Latin1.encode("€").is_err());
    }

    #[test]
    fn test_utf8_decode_strips_bom_and_rejects_invalid() {
        assert_eq!(
            TextEncoding::Utf8.decode(b"\xEF\xBB\xBFMes").as_deref(),
            Some("Mes")
        );
        assert!(TextEncoding::Utf8.decode(&[0x4D, 0xEA, 0x73]).is_none());
    }

    #[test]
    fn test_resolve_path_uses_base_dir() {
        let opts = RewriteOptions {
            base_dir: Some(PathBuf::from("/data")),
            ..RewriteOptions::default()
        };
        assert_eq!(opts.resolve_path("vendas.csv"), PathBuf::from("/data/vendas.csv"));
        assert_eq!(opts.resolve_path("/abs/logo.png"), PathBuf::from("/abs/logo.png"));
        assert_eq!(
            RewriteOptions::default().resolve_path("logo.png"),
            PathBuf::from("logo.png")
        );
    }
}
