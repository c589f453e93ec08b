//! Workbook reading: xlsx bytes → [`Workbook`].
//!
//! Cell values come from calamine. Hyperlink targets are not exposed by
//! calamine, so they are read separately from each worksheet's `<hyperlinks>`
//! block and its relationship part.

use crate::models::{CellValue, Sheet, SourceCell, Workbook};
use calamine::{Data, DataType, Range, Reader, Xlsx};
use chrono::Timelike;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};
use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

const REL_TYPE_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Excel error: {0}")]
    Excel(#[from] calamine::XlsxError),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot read workbook '{filename}': {source}")]
    InFile {
        filename: String,
        #[source]
        source: Box<WorkbookError>,
    },
}

impl WorkbookError {
    /// Attach the uploaded file name to an error.
    pub fn in_file(self, filename: &str) -> Self {
        WorkbookError::InFile {
            filename: filename.to_string(),
            source: Box::new(self),
        }
    }
}

/// Hyperlink targets of one sheet, keyed by zero-based (row, column).
type SheetLinks = HashMap<(u32, u32), String>;

/// Parse an xlsx file held in memory.
pub fn read_workbook(bytes: &[u8]) -> Result<Workbook, WorkbookError> {
    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let mut links = read_hyperlinks(Cursor::new(bytes))?;

    let mut sheets = Vec::new();
    for name in xlsx.sheet_names() {
        let range = xlsx.worksheet_range(&name)?;
        let sheet_links = links.remove(&name).unwrap_or_default();

        let rows = sheet_rows(&range, &sheet_links);

        debug!(
            sheet = %name,
            rows = rows.len(),
            hyperlinks = sheet_links.len(),
            "read worksheet"
        );
        sheets.push(Sheet { name, rows });
    }

    Ok(Workbook { sheets })
}

/// Lay a sheet out as rows of cells anchored at A1, so column positions
/// match the sheet even when the first rows or columns are blank. The grid
/// covers every value and every hyperlink, including links on cells that
/// hold no value.
fn sheet_rows(range: &Range<Data>, links: &SheetLinks) -> Vec<Vec<SourceCell>> {
    let link_end = links
        .keys()
        .copied()
        .reduce(|(mr, mc), (r, c)| (mr.max(r), mc.max(c)));
    let end = match (range.end(), link_end) {
        (Some((vr, vc)), Some((lr, lc))) => Some((vr.max(lr), vc.max(lc))),
        (values, links) => values.or(links),
    };
    let Some((last_row, last_col)) = end else {
        return Vec::new();
    };

    (0..=last_row)
        .map(|r| {
            (0..=last_col)
                .map(|c| SourceCell {
                    value: range.get_value((r, c)).map(cell_value).unwrap_or_default(),
                    hyperlink: links.get(&(r, c)).cloned(),
                })
                .collect()
        })
        .collect()
}

/// Header labels of every sheet, in workbook order.
pub fn workbook_columns(workbook: &Workbook) -> Vec<(String, Vec<String>)> {
    workbook
        .sheets
        .iter()
        .map(|s| (s.name.clone(), s.headers()))
        .collect()
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(_) => match data.as_datetime() {
            Some(dt) if dt.time().num_seconds_from_midnight() == 0 => {
                CellValue::Text(dt.format("%Y-%m-%d").to_string())
            }
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Text(data.to_string()),
        },
        other => CellValue::Text(other.to_string()),
    }
}

// ============================================================================
// Hyperlinks
// ============================================================================

/// Read hyperlink targets for every sheet, keyed by sheet name.
fn read_hyperlinks<R: Read + Seek>(reader: R) -> Result<HashMap<String, SheetLinks>, WorkbookError> {
    let mut archive = ZipArchive::new(reader)?;

    let Some(workbook_xml) = read_part(&mut archive, "xl/workbook.xml")? else {
        return Ok(HashMap::new());
    };
    let workbook_rels = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
        .map(|xml| parse_relationships(&xml))
        .transpose()?
        .unwrap_or_default();

    let mut out = HashMap::new();
    for (sheet_name, rid) in parse_sheet_entries(&workbook_xml)? {
        let Some(rel) = workbook_rels.get(&rid) else {
            continue;
        };
        let part = resolve_target("xl", &rel.target);
        let Some(sheet_xml) = read_part(&mut archive, &part)? else {
            continue;
        };
        let rels = read_part(&mut archive, &rels_part_for(&part))?
            .map(|xml| parse_relationships(&xml))
            .transpose()?
            .unwrap_or_default();

        let links = parse_sheet_hyperlinks(&sheet_xml, &rels)?;
        if !links.is_empty() {
            out.insert(sheet_name, links);
        }
    }

    Ok(out)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, WorkbookError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Relationship part path for a package part: `a/b.xml` → `a/_rels/b.xml.rels`.
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[derive(Clone, Debug)]
struct Relationship {
    ty: String,
    target: String,
}

fn parse_relationships(rels_xml: &str) -> Result<BTreeMap<String, Relationship>, WorkbookError> {
    let mut reader = quick_xml::Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rels = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut ty = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.to_string();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Type" => ty = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let Some(id) = id {
                    rels.insert(
                        id,
                        Relationship {
                            ty: ty.unwrap_or_default(),
                            target: target.unwrap_or_default(),
                        },
                    );
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// `(sheet name, relationship id)` for each `<sheet>` in `xl/workbook.xml`.
fn parse_sheet_entries(workbook_xml: &str) -> Result<Vec<(String, String)>, WorkbookError> {
    let mut reader = quick_xml::Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"name" {
                        name = Some(attr.unescape_value()?.to_string());
                    } else if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some()
                    {
                        rid = Some(attr.unescape_value()?.to_string());
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    entries.push((name, rid));
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn parse_sheet_hyperlinks(
    sheet_xml: &str,
    rels: &BTreeMap<String, Relationship>,
) -> Result<SheetLinks, WorkbookError> {
    let mut reader = quick_xml::Reader::from_str(sheet_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut links = SheetLinks::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"hyperlink" => {
                if let Some((reference, target)) = parse_hyperlink_element(&e, rels)? {
                    match parse_range(&reference) {
                        Some(((r0, c0), (r1, c1))) => {
                            for r in r0..=r1 {
                                for c in c0..=c1 {
                                    links.insert((r, c), target.clone());
                                }
                            }
                        }
                        None => warn!(reference = %reference, "skipping hyperlink with bad cell reference"),
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(links)
}

/// `(ref, target)` of a `<hyperlink>` element, or `None` if it points nowhere.
fn parse_hyperlink_element(
    e: &BytesStart<'_>,
    rels: &BTreeMap<String, Relationship>,
) -> Result<Option<(String, String)>, WorkbookError> {
    let mut reference = None;
    let mut rid = None;
    let mut location = None;

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.to_string();
        match attr.key.as_ref() {
            b"ref" => reference = Some(value),
            b"location" => location = Some(value),
            _ if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() => {
                rid = Some(value)
            }
            _ => {}
        }
    }

    let Some(reference) = reference else {
        return Ok(None);
    };

    let target = match (rid, location) {
        (Some(rid), location) => match rels.get(&rid) {
            Some(rel) if rel.ty == REL_TYPE_HYPERLINK => {
                // An external target may carry a fragment in `location`.
                match location {
                    Some(loc) if !loc.is_empty() => format!("{}#{}", rel.target, loc),
                    _ => rel.target.clone(),
                }
            }
            _ => {
                warn!(rid = %rid, "hyperlink references a missing relationship");
                return Ok(None);
            }
        },
        (None, Some(location)) => format!("#{}", location.trim_start_matches('#')),
        (None, None) => return Ok(None),
    };

    Ok(Some((reference, target)))
}

/// Parse `A1` or `A1:C3` into zero-based inclusive corners.
fn parse_range(reference: &str) -> Option<((u32, u32), (u32, u32))> {
    let reference = reference.trim();
    match reference.split_once(':') {
        Some((a, b)) => {
            let start = parse_cell_ref(a)?;
            let end = parse_cell_ref(b)?;
            Some((
                (start.0.min(end.0), start.1.min(end.1)),
                (start.0.max(end.0), start.1.max(end.1)),
            ))
        }
        None => {
            let cell = parse_cell_ref(reference)?;
            Some((cell, cell))
        }
    }
}

/// Parse an A1-style reference (`$` markers allowed) into zero-based (row, column).
fn parse_cell_ref(a1: &str) -> Option<(u32, u32)> {
    let a1 = a1.trim().replace('$', "");
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col: u32 = 0;
    for c in letters.chars() {
        col = col
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}
