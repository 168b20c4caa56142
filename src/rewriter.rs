//! Document rewriting: applies a tag map to a document.
//!
//! Resolved entries are applied in tag order. Text tags are replaced inside
//! the runs that hold them; image tags become an inline picture appended to
//! the paragraph where the tag was; table tags become a table inserted right
//! after that paragraph.
//!
//! A text tag is only replaced in runs containing the whole token. A tag
//! whose characters are split over several runs (e.g. half of it bold) is
//! left as is and reported as unmatched.

use crate::config::RewriteOptions;
use crate::document::{Block, Document, Picture, Table};
use crate::error::{ResourceKind, Result, TemplateError};
use crate::tabular::Grid;
use crate::tag_map::{Substitution, TagMap};
use crate::tags::TagGrammar;
use serde::Serialize;
use std::path::Path;

/// What a call to [`resolve`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Text tag occurrences replaced
    pub text_replacements: usize,
    pub images: usize,
    pub tables: usize,
    /// Tags present in the map without a value
    pub skipped: Vec<String>,
    /// Tags with a value that were not found in the document
    pub unmatched: Vec<String>,
}

impl ResolveReport {
    pub fn total_applied(&self) -> usize {
        self.text_replacements + self.images + self.tables
    }
}

/// A substitution with its external resource already loaded.
enum Prepared<'a> {
    Text { tag: &'a str, value: &'a str },
    Image { tag: &'a str, picture: Picture },
    Table { tag: &'a str, grid: Grid },
    /// Image or table tag that does not occur in the document
    Absent { tag: &'a str },
}

/// Apply every resolved entry of `map` to `document`.
///
/// Image and table sources are all loaded before the document is touched, so
/// when one of them is missing or unusable the error is returned and the
/// document is left unchanged.
pub fn resolve(
    document: &mut Document,
    map: &TagMap,
    grammar: &TagGrammar,
    options: &RewriteOptions,
) -> Result<ResolveReport> {
    let plan = map.plan(grammar);
    let mut report = ResolveReport {
        skipped: plan.unresolved.iter().map(|t| t.to_string()).collect(),
        ..ResolveReport::default()
    };
    for tag in &report.skipped {
        log::warn!("Skipping unresolved tag {}", tag);
    }

    let prepared = plan
        .substitutions
        .iter()
        .map(|substitution| prepare(document, *substitution, options))
        .collect::<Result<Vec<_>>>()?;

    for item in prepared {
        match item {
            Prepared::Text { tag, value } => {
                let n = replace_text_tag(document, tag, value);
                if n == 0 {
                    log::warn!("Text tag {} not found in any single run", tag);
                    report.unmatched.push(tag.to_string());
                } else {
                    log::debug!("Replaced {} x {}", n, tag);
                    report.text_replacements += n;
                }
            }
            Prepared::Image { tag, picture } => {
                if insert_image(document, tag, picture, options.image_width_inches) {
                    report.images += 1;
                } else {
                    report.unmatched.push(tag.to_string());
                }
            }
            Prepared::Table { tag, grid } => {
                if insert_table(document, tag, &grid) {
                    report.tables += 1;
                } else {
                    report.unmatched.push(tag.to_string());
                }
            }
            Prepared::Absent { tag } => {
                log::warn!("Tag {} not found in document", tag);
                report.unmatched.push(tag.to_string());
            }
        }
    }

    log::info!(
        "Resolved {} text replacements, {} images, {} tables ({} skipped, {} unmatched)",
        report.text_replacements,
        report.images,
        report.tables,
        report.skipped.len(),
        report.unmatched.len()
    );
    Ok(report)
}

fn prepare<'a>(
    document: &Document,
    substitution: Substitution<'a>,
    options: &RewriteOptions,
) -> Result<Prepared<'a>> {
    match substitution {
        Substitution::Text { tag, value } => Ok(Prepared::Text { tag, value }),
        Substitution::Image { tag, .. } | Substitution::Table { tag, .. }
            if document.find_paragraph(tag).is_none() =>
        {
            Ok(Prepared::Absent { tag })
        }
        Substitution::Image { tag, path } => {
            let path = source_path(tag, path, options)?;
            let bytes = std::fs::read(&path)
                .map_err(|e| TemplateError::from_open(ResourceKind::Image, &path, e))?;
            let picture = Picture::from_bytes(bytes).map_err(|reason| {
                TemplateError::ResourceUnavailable {
                    tag: tag.to_string(),
                    path: path.clone(),
                    reason,
                }
            })?;
            Ok(Prepared::Image { tag, picture })
        }
        Substitution::Table { tag, path } => {
            let path = source_path(tag, path, options)?;
            let grid = Grid::from_path(&path, &options.tabular)?;
            if grid.columns().is_empty() {
                return Err(TemplateError::ResourceUnavailable {
                    tag: tag.to_string(),
                    path,
                    reason: "no header row".to_string(),
                });
            }
            Ok(Prepared::Table { tag, grid })
        }
    }
}

fn source_path(tag: &str, value: &str, options: &RewriteOptions) -> Result<std::path::PathBuf> {
    if value.trim().is_empty() {
        return Err(TemplateError::ResourceUnavailable {
            tag: tag.to_string(),
            path: Path::new("").to_path_buf(),
            reason: "no path given".to_string(),
        });
    }
    Ok(options.resolve_path(value))
}

/// Replace `tag` with `value` in every run that holds the whole token.
/// Returns the number of occurrences replaced.
fn replace_text_tag(document: &mut Document, tag: &str, value: &str) -> usize {
    let mut count = 0;
    for paragraph in document.paragraphs_mut() {
        if !paragraph.runs().any(|run| run.text().contains(tag)) {
            continue;
        }
        for run in paragraph.runs_mut() {
            count += run.replace(tag, value);
        }
    }
    count
}

/// Swap the first paragraph holding `tag` for the same paragraph with the
/// tag removed and the picture appended.
fn insert_image(document: &mut Document, tag: &str, picture: Picture, width_inches: f64) -> bool {
    let Some(index) = document.find_paragraph(tag) else {
        return false;
    };
    let run = document.picture_run(picture, width_inches);
    let Some(paragraph) = document.paragraph_mut(index) else {
        return false;
    };
    paragraph.replace_text(tag, "");
    paragraph.push_run(run);
    log::debug!("Inserted image for {} in block {}", tag, index);
    true
}

/// Remove `tag` from the first paragraph holding it and insert the grid as a
/// table right after that paragraph: one header row of column names, then
/// the data rows in column order.
fn insert_table(document: &mut Document, tag: &str, grid: &Grid) -> bool {
    let Some(index) = document.find_paragraph(tag) else {
        return false;
    };
    if let Some(paragraph) = document.paragraph_mut(index) {
        paragraph.replace_text(tag, "");
    }
    document.insert_after(index, Block::Table(grid_table(grid)));
    log::debug!(
        "Inserted {}x{} table for {} after block {}",
        grid.row_count() + 1,
        grid.columns().len(),
        tag,
        index
    );
    true
}

fn grid_table(grid: &Grid) -> Table {
    let mut table = Table::new(grid.row_count() + 1, grid.columns().len());
    for (c, name) in grid.columns().iter().enumerate() {
        table.set_cell(0, c, name);
    }
    for (r, row) in grid.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            table.set_cell(r + 1, c, value);
        }
    }
    table.set_header_rows(1);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Paragraph, Run};
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn options_in(dir: &Path) -> RewriteOptions {
        RewriteOptions {
            base_dir: Some(dir.to_path_buf()),
            ..RewriteOptions::default()
        }
    }

    fn map_of(entries: &[(&str, Option<&str>)]) -> TagMap {
        let mut map = TagMap::new();
        for (tag, value) in entries {
            map.set(tag, *value);
        }
        map
    }

    #[test]
    fn test_text_tag_replaced_in_its_run_only() {
        let xml = concat!(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Cliente: </w:t></w:r>"#,
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t>|NOME|</w:t></w:r>"#,
            r#"<w:r><w:t xml:space="preserve"> fim</w:t></w:r></w:p>"#
        );
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::parse(xml));
        let before: Vec<String> = doc.paragraphs().next().unwrap().runs().map(Run::to_xml).collect();

        let map = map_of(&[("|NOME|", Some("Maria"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &RewriteOptions::default()).unwrap();
        assert_eq!(report.text_replacements, 1);

        let runs: Vec<&Run> = doc.paragraphs().next().unwrap().runs().collect();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].to_xml(), before[0]);
        assert_eq!(runs[1].to_xml(), r#"<w:r><w:rPr><w:i/></w:rPr><w:t>Maria</w:t></w:r>"#);
        assert_eq!(runs[2].to_xml(), before[2]);
    }

    #[test]
    fn test_text_tag_in_every_paragraph_and_repeated() {
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("|A| e |A|"));
        doc.append_paragraph(Paragraph::new("outro"));
        doc.append_paragraph(Paragraph::new("de novo |A|"));
        let map = map_of(&[("|A|", Some("x"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &RewriteOptions::default()).unwrap();
        assert_eq!(report.text_replacements, 3);
        assert_eq!(doc.paragraph_texts(), vec!["x e x", "outro", "de novo x"]);
    }

    #[test]
    fn test_split_text_tag_is_reported_not_replaced() {
        let xml = r#"<w:p><w:r><w:t>|NO</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ME|</w:t></w:r></w:p>"#;
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::parse(xml));
        let map = map_of(&[("|NOME|", Some("Maria"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &RewriteOptions::default()).unwrap();
        assert_eq!(report.text_replacements, 0);
        assert_eq!(report.unmatched, vec!["|NOME|".to_string()]);
        assert_eq!(doc.paragraph_texts(), vec!["|NOME|"]);
    }

    #[test]
    fn test_line_break_inside_token_is_not_a_tag() {
        let xml = r#"<w:p><w:r><w:t>|NO</w:t><w:br/><w:t>ME|</w:t></w:r></w:p>"#;
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::parse(xml));
        let before = doc.to_document_xml();
        let grammar = TagGrammar::default();
        assert!(crate::tags::extract_tags(&grammar, doc.paragraph_texts()).is_empty());

        let map = map_of(&[("|NOME|", Some("Maria"))]);
        let report = resolve(&mut doc, &map, &grammar, &RewriteOptions::default()).unwrap();
        assert_eq!(report.text_replacements, 0);
        assert_eq!(report.unmatched, vec!["|NOME|".to_string()]);
        assert_eq!(doc.to_document_xml(), before);
    }

    #[test]
    fn test_unresolved_tags_are_skipped_and_empty_text_erases() {
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("|A|-|B|-|C|"));
        let map = map_of(&[("|A|", None), ("|B|", Some("")), ("|C|", Some("c"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &RewriteOptions::default()).unwrap();
        assert_eq!(report.skipped, vec!["|A|".to_string()]);
        assert_eq!(doc.paragraph_texts(), vec!["|A|--c"]);
    }

    #[test]
    fn test_table_inserted_after_tag_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vendas.csv"), "Mes,Valor\nJan,10\nFev,20\n").unwrap();

        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("Resumo"));
        doc.append_paragraph(Paragraph::new("Vendas: |TABELA_VENDAS|"));
        doc.append_paragraph(Paragraph::new("Fim"));

        let map = map_of(&[("|TABELA_VENDAS|", Some("vendas.csv"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &options_in(dir.path())).unwrap();
        assert_eq!(report.tables, 1);

        let blocks = doc.blocks();
        assert_eq!(blocks.len(), 4);
        match &blocks[1] {
            Block::Paragraph(p) => assert_eq!(p.text(), "Vendas: "),
            other => panic!("expected paragraph, got {:?}", other),
        }
        let Block::Table(table) = &blocks[2] else {
            panic!("expected table after tag paragraph");
        };
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.cell(0, 0), Some("Mes"));
        assert_eq!(table.cell(0, 1), Some("Valor"));
        assert_eq!(table.cell(2, 0), Some("Fev"));
        assert_eq!(table.cell(2, 1), Some("20"));
        assert!(matches!(&blocks[3], Block::Paragraph(p) if p.text() == "Fim"));
    }

    #[test]
    fn test_table_only_first_paragraph_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.csv"), "a\n1\n").unwrap();
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("|TABLE_T|"));
        doc.append_paragraph(Paragraph::new("|TABLE_T|"));
        let map = map_of(&[("|TABLE_T|", Some("t.csv"))]);
        resolve(&mut doc, &map, &TagGrammar::default(), &options_in(dir.path())).unwrap();
        assert_eq!(doc.tables().count(), 1);
        assert_eq!(doc.paragraph_texts(), vec!["", "|TABLE_T|"]);
    }

    #[test]
    fn test_image_appended_to_tag_paragraph() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), png_bytes(40, 20)).unwrap();

        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("Logo: |IMAGE_LOGO|"));
        let map = map_of(&[("|IMAGE_LOGO|", Some("logo.png"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &options_in(dir.path())).unwrap();
        assert_eq!(report.images, 1);

        let paragraph = doc.paragraphs().next().unwrap();
        assert_eq!(paragraph.text(), "Logo: ");
        assert_eq!(paragraph.runs().count(), 2);
        let xml = doc.to_document_xml();
        assert!(xml.contains(r#"<wp:extent cx="5486400" cy="2743200"/>"#));
        assert!(doc.package().part("word/media/image1.png").is_some());
    }

    #[test]
    fn test_missing_sources_leave_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("|NOME| |IMAGE_X|"));
        let before = doc.to_document_xml();

        let map = map_of(&[("|NOME|", Some("Maria")), ("|IMAGE_X|", Some("x.png"))]);
        let err = resolve(&mut doc, &map, &TagGrammar::default(), &options_in(dir.path())).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::NotFound {
                kind: ResourceKind::Image,
                ..
            }
        ));
        assert_eq!(doc.to_document_xml(), before);
    }

    #[test]
    fn test_unusable_sources_name_the_tag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake.png"), b"plain text").unwrap();
        std::fs::write(dir.path().join("empty.csv"), "").unwrap();

        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("|IMAGE_X| |TABELA_Y| |TABELA_Z|"));
        let grammar = TagGrammar::default();
        let options = options_in(dir.path());

        let err = resolve(&mut doc, &map_of(&[("|IMAGE_X|", Some("fake.png"))]), &grammar, &options)
            .unwrap_err();
        assert!(matches!(err, TemplateError::ResourceUnavailable { ref tag, .. } if tag == "|IMAGE_X|"));

        let err = resolve(&mut doc, &map_of(&[("|TABELA_Y|", Some("empty.csv"))]), &grammar, &options)
            .unwrap_err();
        assert!(matches!(err, TemplateError::ResourceUnavailable { ref tag, .. } if tag == "|TABELA_Y|"));

        let err = resolve(&mut doc, &map_of(&[("|TABELA_Z|", Some(""))]), &grammar, &options)
            .unwrap_err();
        assert!(matches!(err, TemplateError::ResourceUnavailable { ref tag, .. } if tag == "|TABELA_Z|"));
    }

    #[test]
    fn test_absent_image_tag_is_unmatched_without_loading() {
        let mut doc = Document::new();
        doc.append_paragraph(Paragraph::new("sem tags"));
        let map = map_of(&[("|IMAGE_X|", Some("does-not-exist.png")), ("|Y|", Some("y"))]);
        let report = resolve(&mut doc, &map, &TagGrammar::default(), &RewriteOptions::default()).unwrap();
        assert_eq!(report.unmatched, vec!["|IMAGE_X|".to_string(), "|Y|".to_string()]);
        assert_eq!(report.total_applied(), 0);
    }
}
