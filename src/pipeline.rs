//! Upload → configure → unify → join → record.
//!
//! An [`UploadedBundle`] carries everything one unification needs and is
//! passed by value between steps. [`Pipeline`] owns the store and the
//! configuration.

use crate::canonical::slugify;
use crate::document::DocumentError;
use crate::join::{join_text_into, TEXT_COLUMN, URL_COLUMN};
use crate::mapping::{from_form, prefill, Mapping};
use crate::models::{HistoryRecord, Table, UploadedFile};
use crate::store::{HistoryStore, MappingStore, StoreError};
use crate::unify::{unify_with_options, UnifyOptions, ORIGIN_COLUMN};
use crate::workbook::{read_workbook, workbook_columns, WorkbookError};
use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

/// Mapping used when none is chosen.
pub const DEFAULT_MAPPING: &str = "lp";
/// Mapping whose uploads carry a news document.
pub const DOCUMENT_MAPPING: &str = "simbiu";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Message safe to show to an end user, in the same Spanish as the column
    /// names. Parse details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Validation(msg) => msg.clone(),
            PipelineError::Store(StoreError::Conflict(slug)) => {
                format!("Ya existe un mapeo llamado '{slug}'.")
            }
            PipelineError::Store(StoreError::Protected(slug)) => {
                format!("El mapeo predefinido '{slug}' no se puede eliminar.")
            }
            PipelineError::Store(StoreError::NotFound(slug)) => {
                format!("El mapeo '{slug}' no existe.")
            }
            _ => "No se pudo procesar. Revisa los archivos subidos e inténtalo de nuevo.".to_string(),
        }
    }
}

/// Pipeline settings. Defaults match the built-in flavors.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Column recording the source file in multi-file runs.
    pub origin_column: String,
    /// Column added with the joined document text.
    pub text_column: String,
    /// Header (matched by canonical key) of the URL column used for the join.
    pub url_column: String,
    /// Mapping slug whose uploads require a news document.
    pub document_slug: String,
    /// Add the origin column even for one workbook.
    pub force_origin_column: bool,
    /// Output file name prefix.
    pub output_prefix: String,
    /// Show a progress bar while reading several workbooks.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            origin_column: ORIGIN_COLUMN.to_string(),
            text_column: TEXT_COLUMN.to_string(),
            url_column: URL_COLUMN.to_string(),
            document_slug: DOCUMENT_MAPPING.to_string(),
            force_origin_column: false,
            output_prefix: "unificado".to_string(),
            show_progress: false,
        }
    }
}

/// Everything uploaded for one unification.
#[derive(Debug, Clone)]
pub struct UploadedBundle {
    pub workbooks: Vec<UploadedFile>,
    pub document: Option<Vec<u8>>,
    pub mapping_slug: String,
}

impl UploadedBundle {
    /// Validate an upload against the default document slug.
    pub fn new(
        workbooks: Vec<UploadedFile>,
        document: Option<UploadedFile>,
        mapping_choice: &str,
    ) -> Result<Self, PipelineError> {
        Self::with_document_slug(workbooks, document, mapping_choice, DOCUMENT_MAPPING)
    }

    /// Validate an upload. The document is required, and kept, only for
    /// `document_slug`.
    pub fn with_document_slug(
        workbooks: Vec<UploadedFile>,
        document: Option<UploadedFile>,
        mapping_choice: &str,
        document_slug: &str,
    ) -> Result<Self, PipelineError> {
        let Self {
            workbooks,
            mapping_slug,
            ..
        } = Self::workbooks_only(workbooks, mapping_choice)?;

        let document = if mapping_slug == slugify(document_slug) {
            match document {
                Some(doc) if has_extension(&doc.filename, "xml") && !doc.bytes.is_empty() => {
                    Some(doc.bytes)
                }
                _ => {
                    return Err(PipelineError::Validation(format!(
                        "Para planillas '{mapping_slug}' debes subir también el XML."
                    )))
                }
            }
        } else {
            if document.is_some() {
                debug!(slug = %mapping_slug, "ignoring document for mapping without text join");
            }
            None
        };

        Ok(Self {
            workbooks,
            document,
            mapping_slug,
        })
    }

    /// Validate workbooks alone, for inspecting headers before a run.
    pub fn workbooks_only(
        workbooks: Vec<UploadedFile>,
        mapping_choice: &str,
    ) -> Result<Self, PipelineError> {
        let mapping_slug = if mapping_choice.trim().is_empty() {
            DEFAULT_MAPPING.to_string()
        } else {
            slugify(mapping_choice)
        };

        if workbooks.is_empty() {
            return Err(PipelineError::Validation(
                "Sube un archivo Excel (.xlsx) válido.".to_string(),
            ));
        }
        if let Some(bad) = workbooks.iter().find(|w| !has_extension(&w.filename, "xlsx")) {
            return Err(PipelineError::Validation(format!(
                "'{}' no es un archivo Excel (.xlsx) válido.",
                bad.filename
            )));
        }

        Ok(Self {
            workbooks,
            document: None,
            mapping_slug,
        })
    }
}

fn has_extension(filename: &str, ext: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// One header in the configuration step, with the destination it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderChoice {
    pub raw: String,
    pub prefill: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetColumns {
    pub sheet: String,
    pub headers: Vec<HeaderChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileColumns {
    pub filename: String,
    pub sheets: Vec<SheetColumns>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Unified {
    pub table: Table,
    pub mapping_slug: String,
    pub output_name: String,
}

pub struct Pipeline<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: MappingStore + HistoryStore> Pipeline<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, PipelineConfig::default())
    }

    pub fn with_config(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Headers per sheet of every uploaded workbook, pre-filled from the
    /// bundle's stored mapping.
    pub fn columns(&self, bundle: &UploadedBundle) -> Result<Vec<FileColumns>, PipelineError> {
        let mapping = self.store.load(&bundle.mapping_slug)?;
        let mut files = Vec::with_capacity(bundle.workbooks.len());
        for source in &bundle.workbooks {
            let workbook =
                read_workbook(&source.bytes).map_err(|e| e.in_file(&source.filename))?;
            let sheets = workbook_columns(&workbook)
                .into_iter()
                .map(|(sheet, headers)| SheetColumns {
                    sheet,
                    headers: headers
                        .into_iter()
                        .map(|raw| HeaderChoice {
                            prefill: prefill(&raw, &mapping),
                            raw,
                        })
                        .collect(),
                })
                .collect();
            files.push(FileColumns {
                filename: source.filename.clone(),
                sheets,
            });
        }
        Ok(files)
    }

    /// Run the unification and record it in the history.
    ///
    /// Callers that write the table somewhere should use [`Pipeline::build`]
    /// and call [`Pipeline::record`] once the write succeeded.
    pub fn run(
        &mut self,
        bundle: UploadedBundle,
        submitted: Option<Mapping>,
    ) -> Result<Unified, PipelineError> {
        let unified = self.build(bundle, submitted)?;
        self.record(&unified)?;
        Ok(unified)
    }

    /// Build the unified table without touching the history.
    ///
    /// A submitted mapping replaces the stored one first.
    pub fn build(
        &mut self,
        bundle: UploadedBundle,
        submitted: Option<Mapping>,
    ) -> Result<Unified, PipelineError> {
        let result = self.build_inner(bundle, submitted);
        if let Err(e) = &result {
            error!(error = %e, "unification failed");
        }
        result
    }

    fn build_inner(
        &mut self,
        bundle: UploadedBundle,
        submitted: Option<Mapping>,
    ) -> Result<Unified, PipelineError> {
        let slug = bundle.mapping_slug;

        if let Some(submitted) = submitted {
            let cleaned = from_form(submitted);
            self.store.save(&slug, &cleaned)?;
        }
        let mapping = self.store.load(&slug)?;

        let options = UnifyOptions {
            origin_column: self.config.origin_column.clone(),
            force_origin_column: self.config.force_origin_column,
        };
        let mut table = unify_with_options(
            &bundle.workbooks,
            &mapping,
            &options,
            self.config.show_progress,
        )?;

        if slug == slugify(&self.config.document_slug) {
            if let Some(document) = &bundle.document {
                table = join_text_into(
                    table,
                    document,
                    &self.config.url_column,
                    &self.config.text_column,
                )?;
            }
        }

        let output_name = format!("{}_{}.xlsx", self.config.output_prefix, slugify(&slug));
        debug!(slug = %slug, rows = table.row_count(), "unified table built");

        Ok(Unified {
            table,
            mapping_slug: slug,
            output_name,
        })
    }

    /// Append the history record for a finished unification.
    pub fn record(&mut self, unified: &Unified) -> Result<HistoryRecord, PipelineError> {
        let record = HistoryRecord {
            mapping_slug: unified.mapping_slug.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            output_name: unified.output_name.clone(),
        };
        self.store.append(&record)?;

        info!(
            slug = %record.mapping_slug,
            rows = unified.table.row_count(),
            output = %record.output_name,
            "unification recorded"
        );
        Ok(record)
    }
}
