//! Tag grammar and extraction.
//!
//! A tag is a token delimited by the same marker character on both ends, e.g.
//! `|NOME|`. The word right after the opening delimiter decides its role:
//! `|IMAGE_LOGO|` is an image tag, `|TABELA_VENDAS|` a table tag, anything
//! else a text tag.

use crate::tag_map::TagMap;
use regex::Regex;
use std::fmt;

pub const DEFAULT_DELIMITER: char = '|';
pub const IMAGE_PREFIXES: &[&str] = &["IMAGE"];
pub const TABLE_PREFIXES: &[&str] = &["TABELA", "TABLE"];

/// How a tag is substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagRole {
    Text,
    Image,
    Table,
}

impl fmt::Display for TagRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagRole::Text => f.write_str("text"),
            TagRole::Image => f.write_str("image"),
            TagRole::Table => f.write_str("table"),
        }
    }
}

/// Rules for recognising and classifying tags.
#[derive(Debug, Clone)]
pub struct TagGrammar {
    delimiter: char,
    image_prefixes: Vec<String>,
    table_prefixes: Vec<String>,
    pattern: Regex,
}

impl Default for TagGrammar {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER, IMAGE_PREFIXES, TABLE_PREFIXES)
    }
}

impl TagGrammar {
    pub fn new(delimiter: char, image_prefixes: &[&str], table_prefixes: &[&str]) -> Self {
        let d = regex::escape(&delimiter.to_string());
        // delimiter, non-greedy run of anything, delimiter
        let pattern = Regex::new(&format!("{d}.*?{d}")).expect("invalid regex");
        Self {
            delimiter,
            image_prefixes: image_prefixes.iter().map(|p| p.to_string()).collect(),
            table_prefixes: table_prefixes.iter().map(|p| p.to_string()).collect(),
            pattern,
        }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Every tag occurrence in `text`, left to right. Adjacent tags are found
    /// independently and an unpaired delimiter yields nothing.
    pub fn find_tags<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pattern.find_iter(text).map(|m| m.as_str())
    }

    /// Role of a tag token, decided by what follows the opening delimiter.
    pub fn role_of(&self, token: &str) -> TagRole {
        let body = token.strip_prefix(self.delimiter).unwrap_or(token);
        if self.image_prefixes.iter().any(|p| body.starts_with(p.as_str())) {
            TagRole::Image
        } else if self.table_prefixes.iter().any(|p| body.starts_with(p.as_str())) {
            TagRole::Table
        } else {
            TagRole::Text
        }
    }

    /// True when `token` is a complete tag of this grammar.
    pub fn is_tag(&self, token: &str) -> bool {
        self.pattern
            .find(token)
            .is_some_and(|m| m.start() == 0 && m.end() == token.len())
    }
}

/// Collect the distinct tags of all paragraph texts into a map with every
/// value unset. Tags never span paragraphs.
pub fn extract_tags<I, S>(grammar: &TagGrammar, paragraph_texts: I) -> TagMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = TagMap::new();
    for text in paragraph_texts {
        for token in grammar.find_tags(text.as_ref()) {
            map.insert_unset(token);
        }
    }
    log::debug!("Extracted {} distinct tags", map.len());
    map
}
