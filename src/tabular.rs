//! Delimited text sources as a row-major grid of named columns.

use crate::config::TabularConfig;
use crate::error::{ResourceKind, Result, TemplateError};
use std::path::Path;

/// Column names plus rows of cell values, all as display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Load a delimited file. The first record holds the column names.
    pub fn from_path(path: &Path, config: &TabularConfig) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| TemplateError::from_open(ResourceKind::TabularSource, path, e))?;
        let text = config.encoding.decode(&bytes).ok_or_else(|| {
            TemplateError::malformed(
                ResourceKind::TabularSource,
                path,
                format!("not valid {}", config.encoding),
            )
        })?;
        let grid = Self::from_text(&text, config.separator)
            .map_err(|e| TemplateError::malformed(ResourceKind::TabularSource, path, e))?;
        log::debug!(
            "Loaded {} ({} columns, {} rows)",
            path.display(),
            grid.columns.len(),
            grid.rows.len()
        );
        Ok(grid)
    }

    /// Parse already decoded text. Every record must have as many fields as
    /// the header.
    pub fn from_text(text: &str, separator: u8) -> std::result::Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(separator)
            .has_headers(true)
            .from_reader(text.as_bytes());
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Write the grid with the same profile it would be read with.
    pub fn write_to_path(&self, path: &Path, config: &TabularConfig) -> Result<()> {
        let text = self.to_text(config.separator)?;
        let bytes = config.encoding.encode(&text)?;
        std::fs::write(path, bytes).map_err(|e| TemplateError::io(path, e))?;
        log::debug!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn to_text(&self, separator: u8) -> Result<String> {
        let to_io = |e: csv::Error| {
            TemplateError::io(Path::new("<memory>"), std::io::Error::other(e))
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(separator)
            .from_writer(Vec::new());
        writer.write_record(&self.columns).map_err(to_io)?;
        for row in &self.rows {
            writer.write_record(row).map_err(to_io)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| TemplateError::io(Path::new("<memory>"), e.into_error()))?;
        // every field came from a String, so the output is valid UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// Rewrite every cell of one column in place.
    pub fn map_column<F>(&mut self, index: usize, mut f: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(index) {
                if let Some(new_value) = f(cell) {
                    *cell = new_value;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextEncoding;

    #[test]
    fn test_from_text_with_semicolons_and_quotes() {
        let grid = Grid::from_text("Mes;Valor\nJan;\"1;5\"\nFev;20\n", b';').unwrap();
        assert_eq!(grid.columns(), &["Mes".to_string(), "Valor".to_string()]);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.rows()[0], vec!["Jan".to_string(), "1;5".to_string()]);
        assert_eq!(grid.column_index("Valor"), Some(1));
        assert_eq!(grid.column_index("Total"), None);
    }

    #[test]
    fn test_ragged_record_is_an_error() {
        assert!(Grid::from_text("a,b\n1,2,3\n", b',').is_err());
    }

    #[test]
    fn test_latin1_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendas.csv");
        std::fs::write(&path, b"M\xEAs;Valor\nMar\xE7o;10\n").unwrap();

        let config = TabularConfig::semicolon_latin1();
        let grid = Grid::from_path(&path, &config).unwrap();
        assert_eq!(grid.columns()[0], "Mês");
        assert_eq!(grid.rows()[0][0], "Março");

        let out = dir.path().join("out.csv");
        grid.write_to_path(&out, &config).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"M\xEAs;Valor\nMar\xE7o;10\n".to_vec());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.csv");
        assert!(matches!(
            Grid::from_path(&missing, &TabularConfig::default()),
            Err(TemplateError::NotFound {
                kind: ResourceKind::TabularSource,
                ..
            })
        ));

        let latin = dir.path().join("latin.csv");
        std::fs::write(&latin, b"M\xEAs\n1\n").unwrap();
        let utf8 = TabularConfig {
            separator: b',',
            encoding: TextEncoding::Utf8,
        };
        assert!(matches!(
            Grid::from_path(&latin, &utf8),
            Err(TemplateError::Malformed {
                kind: ResourceKind::TabularSource,
                ..
            })
        ));
    }

    #[test]
    fn test_map_column() {
        let mut grid = Grid::new(
            vec!["nome".into(), "idade".into()],
            vec![vec!["Ana".into(), "30".into()], vec!["Bia".into(), "41".into()]],
        );
        grid.map_column(0, |v| (v == "Ana").then(|| "X".to_string()));
        let names: Vec<&str> = grid.column_values(0).collect();
        assert_eq!(names, vec!["X", "Bia"]);
    }
}
