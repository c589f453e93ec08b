//! Sheet Unify Library
//!
//! Unifies spreadsheet workbooks that share a schema but disagree on column
//! headers. Headers are canonicalized, resolved through an editable mapping,
//! and every sheet's rows are laid out on one deterministic column order.
//! Hyperlinked cells survive as (display text, target) pairs, and news
//! full text can be joined onto rows by the article code in their URL.
//!
//! # Example
//!
//! ```no_run
//! use sheet_unify::prelude::*;
//!
//! let bytes = std::fs::read("enero.xlsx").unwrap();
//! let sources = vec![UploadedFile::new("enero.xlsx", bytes)];
//!
//! let mut mapping = Mapping::new();
//! mapping.insert("Fecha Publicación".to_string(), "fecha".to_string());
//!
//! let table = unify(&sources, &mapping).unwrap();
//! println!("{} rows, columns: {:?}", table.row_count(), table.columns);
//! ```
//!
//! # Pipeline Example
//!
//! ```no_run
//! use sheet_unify::prelude::*;
//!
//! let mut pipeline = Pipeline::new(MemoryStore::new());
//!
//! let workbook = UploadedFile::new("impresos.xlsx", std::fs::read("impresos.xlsx").unwrap());
//! let document = UploadedFile::new("noticias.xml", std::fs::read("noticias.xml").unwrap());
//! let bundle = UploadedBundle::new(vec![workbook], Some(document), "simbiu").unwrap();
//!
//! let unified = pipeline.run(bundle, None).unwrap();
//! write_xlsx_file(&unified.table, std::path::Path::new(&unified.output_name)).unwrap();
//! ```

pub mod canonical;
pub mod document;
pub mod join;
pub mod mapping;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod unify;
pub mod workbook;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::canonical::{canonicalize, slugify};
    pub use crate::document::{extract_code, extract_text_records, DocumentError};
    pub use crate::join::{join_text, TEXT_COLUMN};
    pub use crate::mapping::{resolve_destination, Mapping};
    pub use crate::models::{CellValue, SourceCell, Sheet, Table, Workbook, UploadedFile};
    pub use crate::output::{
        print_summary, write_csv_file, write_json_file, write_xlsx, write_xlsx_file, OutputError,
        OutputFormat,
    };
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, UploadedBundle, Unified};
    pub use crate::store::{HistoryStore, MappingStore, MemoryStore, SqliteStore, StoreError};
    pub use crate::unify::{unify, unify_with_options, unify_workbook, UnifyOptions, ORIGIN_COLUMN};
    pub use crate::workbook::{read_workbook, WorkbookError};
}
