//! Output formatting for unified tables (xlsx, JSON, CSV).

use crate::models::{CellValue, Table};
use rust_xlsxwriter::{Format, Url, Workbook, Worksheet};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Longest string Excel stores in a cell.
pub const MAX_CELL_CHARS: usize = 32_767;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xlsx writer error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("table too large for a worksheet: {0}")]
    TooLarge(String),
}

/// Output format, usually picked from the output file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(OutputFormat::Xlsx),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// Build the xlsx bytes for a table.
///
/// Row 1 holds the column names in bold. Link pairs become hyperlinks that
/// show their display text.
pub fn table_to_xlsx(table: &Table) -> Result<Vec<u8>, OutputError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header = Format::new().set_bold();

    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col_num(col)?, clip(name), &header)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = u32::try_from(r + 1).map_err(|_| OutputError::TooLarge(format!("row {}", r + 1)))?;
        for (c, value) in row.iter().enumerate() {
            write_cell(worksheet, r, col_num(c)?, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<(), OutputError> {
    match value {
        CellValue::Empty => {}
        CellValue::Text(s) if s.is_empty() => {}
        CellValue::Text(s) => {
            worksheet.write_string(row, col, clip(s))?;
        }
        CellValue::Number(n) => {
            worksheet.write_number(row, col, *n)?;
        }
        CellValue::Link { display, target } => {
            let link = Url::new(excel_link_target(target));
            if let Err(e) = worksheet.write_url_with_text(row, col, link, clip(display)) {
                // Targets Excel cannot store as hyperlinks are kept as text.
                warn!(row, col, target = %target, error = %e, "writing link as plain text");
                worksheet.write_string(row, col, clip(display))?;
            }
        }
    }
    Ok(())
}

/// `#Sheet!A1` locations use the writer's `internal:` scheme.
fn excel_link_target(target: &str) -> String {
    match target.strip_prefix('#') {
        Some(location) => format!("internal:{location}"),
        None => target.to_string(),
    }
}

fn col_num(col: usize) -> Result<u16, OutputError> {
    u16::try_from(col).map_err(|_| OutputError::TooLarge(format!("column {}", col + 1)))
}

fn clip(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => {
            warn!(chars = s.chars().count(), "cell text truncated to Excel's limit");
            &s[..idx]
        }
        None => s,
    }
}

/// Write a table as xlsx.
pub fn write_xlsx<W: Write>(table: &Table, writer: &mut W) -> Result<(), OutputError> {
    writer.write_all(&table_to_xlsx(table)?)?;
    Ok(())
}

/// Write a table as xlsx to a file.
pub fn write_xlsx_file(table: &Table, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_xlsx(table, &mut file)
}

/// Write a table as JSON (columns plus tagged cell values).
pub fn write_json<W: Write>(table: &Table, writer: &mut W) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(table)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

/// Write a table as JSON to a file.
pub fn write_json_file(table: &Table, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_json(table, &mut file)
}

/// Write a table as CSV. Link pairs are written as their display text.
pub fn write_csv<W: Write>(table: &Table, writer: &mut W) -> Result<(), OutputError> {
    let header: Vec<String> = table.columns.iter().map(|c| csv_field(c)).collect();
    writeln!(writer, "{}", header.join(","))?;

    for row in &table.rows {
        let fields: Vec<String> = row
            .iter()
            .map(|value| csv_field(&value.display_text()))
            .collect();
        writeln!(writer, "{}", fields.join(","))?;
    }

    Ok(())
}

/// Write a table as CSV to a file.
pub fn write_csv_file(table: &Table, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_csv(table, &mut file)
}

/// Quote a CSV field if it contains a separator, quote or line break.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write a table in the given format to a file.
pub fn write_table_file(table: &Table, path: &Path, format: OutputFormat) -> Result<(), OutputError> {
    match format {
        OutputFormat::Xlsx => write_xlsx_file(table, path),
        OutputFormat::Json => write_json_file(table, path),
        OutputFormat::Csv => write_csv_file(table, path),
    }
}

/// Write a summary report to stdout.
pub fn print_summary(table: &Table) {
    let links = table
        .rows
        .iter()
        .flatten()
        .filter(|v| matches!(v, CellValue::Link { .. }))
        .count();

    println!("\n=== Unification Summary ===");
    println!("Rows: {}", table.row_count());
    println!("Columns: {}", table.column_count());
    println!("Link cells: {}", links);
    println!();
    println!("Column order:");
    for (i, column) in table.columns.iter().enumerate() {
        let filled = table
            .rows
            .iter()
            .filter(|row| !row[i].is_empty())
            .count();
        println!("  {:>3}. {} ({} filled)", i + 1, column, filled);
    }
}

/// Print the first rows of a table.
pub fn print_rows(table: &Table, limit: Option<usize>) {
    let limit = limit.unwrap_or(table.row_count());
    println!("{}", table.columns.join(" | "));
    for row in table.rows.iter().take(limit) {
        let cells: Vec<String> = row.iter().map(format_cell).collect();
        println!("{}", cells.join(" | "));
    }
    if table.row_count() > limit {
        println!("... and {} more rows", table.row_count() - limit);
    }
}

/// Format a cell for console output; links show as `text <target>`.
pub fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Link { display, target } if display != target => {
            format!("{} <{}>", display, target)
        }
        other => other.display_text(),
    }
}
