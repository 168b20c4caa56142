//! A template session: one document, the grammar its tags follow, and the
//! tag map that will be applied to it.

use crate::config::RewriteOptions;
use crate::document::Document;
use crate::error::{Result, TemplateError};
use crate::rewriter::{self, ResolveReport};
use crate::tag_map::TagMap;
use crate::tags::{self, TagGrammar};
use std::path::Path;

pub struct Template {
    document: Document,
    grammar: TagGrammar,
    tag_map: Option<TagMap>,
    options: RewriteOptions,
}

impl Template {
    /// Open a DOCX template with the default grammar and options.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_document(Document::open(path)?))
    }

    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            grammar: TagGrammar::default(),
            tag_map: None,
            options: RewriteOptions::default(),
        }
    }

    pub fn with_grammar(mut self, grammar: TagGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn with_options(mut self, options: RewriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Every distinct tag in the document's body paragraphs, values unset.
    pub fn extract_tags(&self) -> TagMap {
        tags::extract_tags(&self.grammar, self.document.paragraph_texts())
    }

    /// Extract the tags and write them to a new tag file.
    pub fn export_tags(&self, destination: &Path) -> Result<TagMap> {
        let map = self.extract_tags();
        map.export(destination)?;
        Ok(map)
    }

    /// Load the tag map that [`Template::resolve`] will apply.
    pub fn load_tag_map(&mut self, source: &Path) -> Result<&TagMap> {
        let map = TagMap::load(source)?;
        Ok(&*self.tag_map.insert(map))
    }

    pub fn set_tag_map(&mut self, map: TagMap) {
        self.tag_map = Some(map);
    }

    pub fn tag_map(&self) -> Option<&TagMap> {
        self.tag_map.as_ref()
    }

    /// Apply the loaded tag map to the document.
    pub fn resolve(&mut self) -> Result<ResolveReport> {
        let map = self.tag_map.as_ref().ok_or_else(|| {
            TemplateError::Precondition("resolve called before a tag map was loaded".to_string())
        })?;
        rewriter::resolve(&mut self.document, map, &self.grammar, &self.options)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.document.save(path)?;
        log::info!("Saved {}", path.display());
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}
