//! DOCX Templater
//!
//! Fill tagged Word templates: find `|TAG|` placeholders, hand their list out
//! as an editable JSON tag file, then write a new document with every tag
//! replaced by text, an image, or a table built from a CSV file.
//!
//! This library provides:
//! - `tags`: Tag grammar, roles and extraction
//! - `tag_map`: Tag map persistence and classified substitutions
//! - `rewriter`: Applies a tag map to a document
//! - `template`: Session tying a document to its tag map
//! - `document`, `package`, `xml`: The DOCX model the rewriter edits
//! - `tabular`: CSV sources as named-column grids
//! - `anonymize`: Consistent pseudo-anonymization of CSV columns
//!
//! Binaries:
//! - `docx-template`: Extract tags, inspect tag files, render documents
//! - `csv-anon`: Anonymize CSV columns with pt-BR synthetic data

pub mod anonymize;
pub mod config;
pub mod document;
pub mod error;
pub mod package;
pub mod rewriter;
pub mod tabular;
pub mod tag_map;
pub mod tags;
pub mod template;
pub mod xml;

pub use config::{RewriteOptions, TabularConfig, TextEncoding};
pub use document::{Block, Document, Paragraph, Picture, Run, Table};
pub use error::{ResourceKind, Result, TemplateError};
pub use rewriter::{resolve, ResolveReport};
pub use tabular::Grid;
pub use tag_map::{Substitution, TagMap};
pub use tags::{extract_tags, TagGrammar, TagRole};
pub use template::Template;
