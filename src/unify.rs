//! Sheet and workbook unification.
//!
//! Every sheet's headers are resolved through the [`Mapping`] to destination
//! columns. The destination order is the first-seen order over all sheets,
//! left to right; each data row is then laid out on that order.

use crate::mapping::{resolve_headers, Mapping};
use crate::models::{CellValue, SourceCell, Table, Workbook, UploadedFile};
use crate::workbook::{read_workbook, WorkbookError};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Column recording the source file when several workbooks are unified.
pub const ORIGIN_COLUMN: &str = "archivo_origen";

/// Options for multi-workbook unification.
#[derive(Debug, Clone)]
pub struct UnifyOptions {
    /// Name of the origin column.
    pub origin_column: String,
    /// Add the origin column even for a single workbook.
    pub force_origin_column: bool,
}

impl Default for UnifyOptions {
    fn default() -> Self {
        Self {
            origin_column: ORIGIN_COLUMN.to_string(),
            force_origin_column: false,
        }
    }
}

/// Destination column order for a workbook: first-seen, deduplicated.
/// Headers that resolve to nothing are left out.
pub fn destination_order(workbook: &Workbook, mapping: &Mapping) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for sheet in &workbook.sheets {
        for dest in resolve_headers(&sheet.headers(), mapping).into_iter().flatten() {
            if !order.contains(&dest) {
                order.push(dest);
            }
        }
    }
    order
}

/// Unify all sheets of one workbook into a single table.
///
/// When two columns of the same sheet resolve to the same destination, the
/// rightmost one wins for every row.
pub fn unify_workbook(workbook: &Workbook, mapping: &Mapping) -> Table {
    let columns = destination_order(workbook, mapping);
    let position: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut rows = Vec::new();
    for sheet in &workbook.sheets {
        let idx_to_pos: Vec<Option<usize>> = resolve_headers(&sheet.headers(), mapping)
            .into_iter()
            .map(|dest| dest.and_then(|d| position.get(d.as_str()).copied()))
            .collect();

        for source_row in sheet.data_rows() {
            let mut row = vec![CellValue::Empty; columns.len()];
            for (idx, cell) in source_row.iter().enumerate() {
                // Cells beyond the header row have no destination.
                let Some(Some(pos)) = idx_to_pos.get(idx) else {
                    continue;
                };
                row[*pos] = contributed_value(cell);
            }
            rows.push(row);
        }

        debug!(
            sheet = %sheet.name,
            rows = sheet.data_rows().len(),
            "unified sheet"
        );
    }

    Table { columns, rows }
}

/// Value a source cell contributes to the unified table.
///
/// Hyperlinked cells become link pairs; bare URL text becomes a link to
/// itself; anything else passes through.
pub fn contributed_value(cell: &SourceCell) -> CellValue {
    match (&cell.hyperlink, &cell.value) {
        (Some(target), value) if !target.is_empty() => {
            let display = value.display_text();
            CellValue::Link {
                display: if display.is_empty() {
                    target.clone()
                } else {
                    display
                },
                target: target.clone(),
            }
        }
        (_, CellValue::Text(text)) if looks_like_url(text) => {
            let url = text.trim().to_string();
            CellValue::Link {
                display: url.clone(),
                target: url,
            }
        }
        (_, value) => value.clone(),
    }
}

/// Whether text is a bare `http(s)://` URL.
pub fn looks_like_url(text: &str) -> bool {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE
        .get_or_init(|| Regex::new(r"(?i)^https?://\S+$").expect("URL pattern is valid"))
        .is_match(text.trim())
}

/// Unify workbook files into one table with default options.
pub fn unify(sources: &[UploadedFile], mapping: &Mapping) -> Result<Table, WorkbookError> {
    unify_with_options(sources, mapping, &UnifyOptions::default(), false)
}

/// Unify workbook files into one table.
///
/// Each workbook is unified on its own. With more than one workbook (or when
/// forced) an origin column holding each file's name stem is appended, and
/// the tables are stacked over the union of their columns. Any unreadable
/// workbook aborts the whole operation.
pub fn unify_with_options(
    sources: &[UploadedFile],
    mapping: &Mapping,
    options: &UnifyOptions,
    show_progress: bool,
) -> Result<Table, WorkbookError> {
    let multi_file = sources.len() > 1 || options.force_origin_column;

    let pb = if show_progress && sources.len() > 1 {
        let pb = ProgressBar::new(sources.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut frames = Vec::with_capacity(sources.len());
    for source in sources {
        if let Some(pb) = &pb {
            pb.set_message(source.filename.clone());
        }

        let workbook = read_workbook(&source.bytes).map_err(|e| e.in_file(&source.filename))?;
        let mut table = unify_workbook(&workbook, mapping);
        if multi_file {
            table.fill_column(&options.origin_column, CellValue::Text(source.stem()));
        }
        debug!(
            file = %source.filename,
            rows = table.row_count(),
            columns = table.column_count(),
            "unified workbook"
        );
        frames.push(table);

        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let table = if multi_file {
        concat_tables(frames, &options.origin_column)
    } else {
        frames.pop().unwrap_or_default()
    };

    info!(
        files = sources.len(),
        rows = table.row_count(),
        columns = table.column_count(),
        "unification finished"
    );
    Ok(table)
}

/// Stack tables over the union of their columns (first-seen order), keeping
/// `last_column` at the end. Missing cells are empty.
pub fn concat_tables(tables: Vec<Table>, last_column: &str) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for table in &tables {
        for column in &table.columns {
            if column != last_column && !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    if tables
        .iter()
        .any(|t| t.columns.iter().any(|c| c == last_column))
    {
        columns.push(last_column.to_string());
    }

    let position: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut rows = Vec::with_capacity(tables.iter().map(Table::row_count).sum());
    for table in &tables {
        let remap: Vec<usize> = table.columns.iter().map(|c| position[c.as_str()]).collect();
        for source_row in &table.rows {
            let mut row = vec![CellValue::Empty; columns.len()];
            for (value, &pos) in source_row.iter().zip(&remap) {
                row[pos] = value.clone();
            }
            rows.push(row);
        }
    }

    Table { columns, rows }
}
