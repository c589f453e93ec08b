//! Data structures shared by the unification pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value, as read from a workbook or produced for output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    /// A clickable link: `display` is what the viewer shows, `target` where it points.
    Link { display: String, target: String },
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Text shown to a reader of the cell (link pairs show their display text).
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Link { display, .. } => display.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Integral floats print without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A cell as read from a sheet: its value plus an optional hyperlink target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCell {
    pub value: CellValue,
    pub hyperlink: Option<String>,
}

impl SourceCell {
    pub fn plain(value: impl Into<CellValue>) -> Self {
        Self {
            value: value.into(),
            hyperlink: None,
        }
    }

    pub fn linked(value: impl Into<CellValue>, target: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            hyperlink: Some(target.into()),
        }
    }
}

/// One worksheet: row 0 is the header row, the rest are data rows.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<SourceCell>>,
}

impl Sheet {
    /// Header labels with blank headers replaced by `col_<n>` (1-indexed).
    pub fn headers(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let label = cell.value.display_text();
                        if label.is_empty() {
                            format!("col_{}", i + 1)
                        } else {
                            label
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Data rows (everything after the header row).
    pub fn data_rows(&self) -> &[Vec<SourceCell>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}

/// An in-memory workbook: its sheets in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// An uploaded file (workbook or news document): file name plus its bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// File name without directories or extension, used as the origin identifier.
    pub fn stem(&self) -> String {
        std::path::Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }
}

/// A unified table: named columns in order and fixed-width rows aligned to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Set every row of a column to `fill` (see [`Table::set_column`]).
    pub fn fill_column(&mut self, name: &str, fill: CellValue) {
        let values = vec![fill; self.rows.len()];
        self.set_column(name, values);
    }

    /// Set a column's values, one per row. An existing column of that name
    /// is overwritten in place; otherwise the column is appended. Column
    /// names stay unique either way.
    pub fn set_column(&mut self, name: &str, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Get a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }
}

/// A (code, full text) pair extracted from a news document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    pub code: String,
    pub text: String,
}

/// One completed unification, as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub mapping_slug: String,
    /// RFC 3339 timestamp (UTC).
    pub timestamp: String,
    pub output_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_headers_get_positional_names() {
        let sheet = Sheet {
            name: "Hoja1".to_string(),
            rows: vec![vec![
                SourceCell::plain("Medio"),
                SourceCell::default(),
                SourceCell::plain("Fecha"),
                SourceCell::plain(""),
            ]],
        };
        assert_eq!(sheet.headers(), vec!["Medio", "col_2", "Fecha", "col_4"]);
        assert!(sheet.data_rows().is_empty());
    }

    #[test]
    fn test_empty_sheet_has_no_headers() {
        let sheet = Sheet::default();
        assert!(sheet.headers().is_empty());
        assert!(sheet.data_rows().is_empty());
    }

    #[test]
    fn test_numeric_header_uses_display_text() {
        let sheet = Sheet {
            name: "S".to_string(),
            rows: vec![vec![SourceCell::plain(2024.0)]],
        };
        assert_eq!(sheet.headers(), vec!["2024"]);
    }

    #[test]
    fn test_stem() {
        assert_eq!(UploadedFile::new("enero.xlsx", vec![]).stem(), "enero");
        assert_eq!(UploadedFile::new("dir/feb.2025.xlsx", vec![]).stem(), "feb.2025");
        assert_eq!(UploadedFile::new("sin_ext", vec![]).stem(), "sin_ext");
    }

    #[test]
    fn test_cell_text_forms() {
        let link = CellValue::Link {
            display: "Nota".to_string(),
            target: "https://x.cl/VerNoticia/1".to_string(),
        };
        assert_eq!(link.display_text(), "Nota");
        assert_eq!(CellValue::Number(3.0).display_text(), "3");
        assert_eq!(CellValue::Number(2.5).display_text(), "2.5");
        assert!(CellValue::Text(String::new()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }

    #[test]
    fn test_set_column_overwrites_existing_name() {
        let mut table = Table {
            columns: vec!["texto".to_string(), "medio".to_string()],
            rows: vec![vec![CellValue::from("viejo"), CellValue::from("Diario")]],
        };

        table.set_column("texto", vec![CellValue::from("nuevo")]);
        assert_eq!(table.columns, vec!["texto", "medio"]);
        assert_eq!(table.get(0, "texto"), Some(&CellValue::from("nuevo")));

        table.fill_column("archivo_origen", CellValue::from("enero"));
        assert_eq!(table.columns, vec!["texto", "medio", "archivo_origen"]);
        assert_eq!(table.rows[0].len(), 3);
    }
}
