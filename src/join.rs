//! Left join of document full text onto a unified table.

use crate::canonical::canonicalize;
use crate::document::{extract_code, extract_text_records, DocumentError};
use crate::models::{CellValue, Table};
use tracing::{debug, warn};

/// Column added by [`join_text`].
pub const TEXT_COLUMN: &str = "texto";
/// Header (any casing or accents) of the column holding the article URL.
pub const URL_COLUMN: &str = "URL_Noticia";

/// Append a `texto` column holding each row's article full text. A column
/// already named `texto` is overwritten in place.
///
/// A no-op when `document` is empty or the table has no URL column. Rows
/// whose URL yields no code, or a code absent from the document, get an
/// empty text.
pub fn join_text(table: Table, document: &[u8]) -> Result<Table, DocumentError> {
    join_text_into(table, document, URL_COLUMN, TEXT_COLUMN)
}

/// [`join_text`] with explicit URL and text column names.
pub fn join_text_into(
    mut table: Table,
    document: &[u8],
    url_column: &str,
    text_column: &str,
) -> Result<Table, DocumentError> {
    if document.is_empty() {
        return Ok(table);
    }

    let url_key = canonicalize(url_column);
    let Some(url_idx) = table.columns.iter().position(|c| canonicalize(c) == url_key) else {
        warn!(column = url_column, "no URL column; skipping text join");
        return Ok(table);
    };

    let texts = extract_text_records(document)?;

    let mut matched = 0usize;
    let values: Vec<CellValue> = table
        .rows
        .iter()
        .map(|row| {
            let text = row_code(&row[url_idx]).and_then(|code| texts.get(&code));
            if text.is_some() {
                matched += 1;
            }
            CellValue::Text(text.cloned().unwrap_or_default())
        })
        .collect();

    if table.column_index(text_column).is_some() {
        warn!(column = text_column, "replacing existing column with joined text");
    }
    table.set_column(text_column, values);

    debug!(
        rows = table.rows.len(),
        matched,
        records = texts.len(),
        "joined document text"
    );
    Ok(table)
}

/// Article code of a URL cell; link pairs are matched on their target first.
fn row_code(cell: &CellValue) -> Option<String> {
    let code = match cell {
        CellValue::Link { display, target } => extract_code(target).or_else(|| extract_code(display)),
        other => return extract_code(&other.display_text()).map(str::to_string),
    };
    code.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"<root>
  <noticia><Url_Noticia>https://s.cl/index/1/12345</Url_Noticia><FullText> Hello </FullText></noticia>
  <noticia><Url_Noticia>https://s.cl/VerNoticia/9</Url_Noticia><FullText>Nine</FullText></noticia>
</root>"#;

    fn table() -> Table {
        Table {
            columns: vec!["medio".to_string(), "Url_Noticia".to_string()],
            rows: vec![
                vec![
                    CellValue::Text("Diario".to_string()),
                    CellValue::Text("https://s.cl/VerNoticia/12345".to_string()),
                ],
                vec![
                    CellValue::Text("Radio".to_string()),
                    CellValue::Text("https://s.cl/VerNoticia/555".to_string()),
                ],
                vec![
                    CellValue::Text("TV".to_string()),
                    CellValue::Link {
                        display: "ver".to_string(),
                        target: "https://s.cl/index/1/9".to_string(),
                    },
                ],
                vec![CellValue::Text("Web".to_string()), CellValue::Empty],
            ],
        }
    }

    #[test]
    fn test_joins_text_by_code() {
        let joined = join_text(table(), DOC).unwrap();
        assert_eq!(joined.columns, vec!["medio", "Url_Noticia", TEXT_COLUMN]);
        let texts: Vec<String> = joined
            .column(TEXT_COLUMN)
            .unwrap()
            .into_iter()
            .map(CellValue::display_text)
            .collect();
        assert_eq!(texts, vec!["Hello", "", "Nine", ""]);
        assert!(joined.rows.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_url_column_found_regardless_of_case_and_accents() {
        let mut t = table();
        t.columns[1] = "URL Notícia".to_string();
        let joined = join_text(t, DOC).unwrap();
        assert_eq!(joined.get(0, TEXT_COLUMN), Some(&CellValue::Text("Hello".to_string())));
    }

    #[test]
    fn test_empty_document_is_noop() {
        let joined = join_text(table(), b"").unwrap();
        assert_eq!(joined, table());
    }

    #[test]
    fn test_missing_url_column_is_noop() {
        let mut t = table();
        t.columns[1] = "enlace".to_string();
        let joined = join_text(t.clone(), DOC).unwrap();
        assert_eq!(joined, t);
    }

    #[test]
    fn test_malformed_document_propagates() {
        assert!(join_text(table(), b"<root><noticia>").is_err());
    }

    #[test]
    fn test_existing_text_column_is_overwritten() {
        let mut t = table();
        t.columns[0] = TEXT_COLUMN.to_string();
        let joined = join_text(t, DOC).unwrap();
        assert_eq!(joined.columns, vec![TEXT_COLUMN, "Url_Noticia"]);
        assert_eq!(joined.get(0, TEXT_COLUMN), Some(&CellValue::Text("Hello".to_string())));
        assert_eq!(joined.get(1, TEXT_COLUMN), Some(&CellValue::Text(String::new())));
        assert!(joined.rows.iter().all(|r| r.len() == 2));
    }
}
