//! Tag map: tag token -> optional replacement value, kept in lexicographic
//! token order so exported tag files are stable and diffable.

use crate::error::{ResourceKind, Result, TemplateError};
use crate::tags::{TagGrammar, TagRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Mapping from tag token to its value. `None` marks an unresolved tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMap {
    entries: BTreeMap<String, Option<String>>,
}

/// One resolved tag, classified by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution<'a> {
    /// Literal replacement text
    Text { tag: &'a str, value: &'a str },
    /// Path to the image shown where the tag was
    Image { tag: &'a str, path: &'a str },
    /// Path to the delimited file rendered as a table where the tag was
    Table { tag: &'a str, path: &'a str },
}

impl<'a> Substitution<'a> {
    pub fn tag(&self) -> &'a str {
        match self {
            Substitution::Text { tag, .. }
            | Substitution::Image { tag, .. }
            | Substitution::Table { tag, .. } => tag,
        }
    }

    pub fn role(&self) -> TagRole {
        match self {
            Substitution::Text { .. } => TagRole::Text,
            Substitution::Image { .. } => TagRole::Image,
            Substitution::Table { .. } => TagRole::Table,
        }
    }
}

/// The work a tag map describes: resolved substitutions in tag order, plus
/// the tags left unresolved.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan<'a> {
    pub substitutions: Vec<Substitution<'a>>,
    pub unresolved: Vec<&'a str>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag with no value. An existing value is left alone.
    pub fn insert_unset(&mut self, tag: &str) {
        self.entries.entry(tag.to_string()).or_insert(None);
    }

    /// Set (or clear, with `None`) the value of a tag.
    pub fn set(&mut self, tag: &str, value: Option<&str>) {
        self.entries
            .insert(tag.to_string(), value.map(str::to_string));
    }

    /// `None` when the tag is absent, `Some(None)` when it is unresolved.
    pub fn get(&self, tag: &str) -> Option<Option<&str>> {
        self.entries.get(tag).map(|v| v.as_deref())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tags in lexicographic order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in lexicographic tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(tag, value)| (tag.as_str(), value.as_deref()))
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_none()).count()
    }

    /// Classify every resolved entry by role, in tag order.
    pub fn plan<'a>(&'a self, grammar: &TagGrammar) -> ResolutionPlan<'a> {
        let mut plan = ResolutionPlan::default();
        for (tag, value) in self.iter() {
            let Some(value) = value else {
                plan.unresolved.push(tag);
                continue;
            };
            let substitution = match grammar.role_of(tag) {
                TagRole::Text => Substitution::Text { tag, value },
                TagRole::Image => Substitution::Image { tag, path: value },
                TagRole::Table => Substitution::Table { tag, path: value },
            };
            plan.substitutions.push(substitution);
        }
        plan
    }

    /// Pretty JSON with four-space indentation and keys in tag order.
    pub fn to_json(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        // string keys and string/null values cannot fail to serialize
        if self.serialize(&mut ser).is_err() {
            return "{}".to_string();
        }
        buf.push(b'\n');
        String::from_utf8(buf).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Write the map to a new tag file. Fails with `Conflict` when
    /// `destination` already exists; the existing file is not touched.
    pub fn export(&self, destination: &Path) -> Result<()> {
        let json = self.to_json();
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    TemplateError::Conflict(destination.to_path_buf())
                }
                _ => TemplateError::io(destination, e),
            })?;
        file.write_all(json.as_bytes())
            .map_err(|e| TemplateError::io(destination, e))?;
        log::info!(
            "Exported {} tags to {}",
            self.len(),
            destination.display()
        );
        Ok(())
    }

    /// Read a tag file written by [`TagMap::export`] (or edited by hand).
    pub fn load(source: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => {
                TemplateError::malformed(ResourceKind::TagFile, source, "not valid UTF-8")
            }
            _ => TemplateError::from_open(ResourceKind::TagFile, source, e),
        })?;
        let map = Self::from_json(&json)
            .map_err(|e| TemplateError::malformed(ResourceKind::TagFile, source, e))?;
        log::info!(
            "Loaded {} tags ({} unresolved) from {}",
            map.len(),
            map.unresolved_count(),
            source.display()
        );
        Ok(map)
    }
}

impl FromIterator<(String, Option<String>)> for TagMap {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, value) in self.iter() {
            match value {
                Some(value) => writeln!(f, "{} = {}", tag, value)?,
                None => writeln!(f, "{} (unresolved)", tag)?,
            }
        }
        Ok(())
    }
}
