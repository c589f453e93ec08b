//! Sheet Unify command line
//!
//! Unifies spreadsheet workbooks with inconsistent headers into one table and
//! manages the named header mappings used to do it.

use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use sheet_unify::canonical::canonicalize;
use sheet_unify::mapping::{parse_pairs, Mapping};
use sheet_unify::models::UploadedFile;
use sheet_unify::output::{print_rows, print_summary, write_table_file, OutputFormat};
use sheet_unify::pipeline::{Pipeline, PipelineConfig, PipelineError, UploadedBundle};
use sheet_unify::store::{HistoryStore, MappingStore, SqliteStore};

#[derive(Parser)]
#[command(name = "sheet-unify")]
#[command(about = "Unify spreadsheet workbooks with inconsistent headers")]
#[command(version)]
struct Cli {
    /// SQLite file holding mappings and history
    #[arg(long, global = true, env = "SHEET_UNIFY_STORE", default_value = "sheet-unify.db")]
    store: PathBuf,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format (CLI version, mirrors output::OutputFormat)
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFormat {
    /// Excel workbook with clickable links
    Xlsx,
    /// JSON with tagged cell values
    Json,
    /// CSV (links exported as their display text)
    Csv,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Xlsx => OutputFormat::Xlsx,
            CliFormat::Json => OutputFormat::Json,
            CliFormat::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Unify one or more workbooks into a single table
    Unify {
        /// Workbook files (.xlsx)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Mapping (spreadsheet flavor) to apply
        #[arg(long, default_value = "lp")]
        mapping: String,

        /// News XML document (required for the simbiu mapping)
        #[arg(long)]
        document: Option<PathBuf>,

        /// Header overrides saved into the mapping before unifying (RAW=DEST)
        #[arg(long = "map", value_name = "RAW=DEST")]
        overrides: Vec<String>,

        /// Output file path [default: unificado_<mapping>.xlsx]
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format [default: from the output extension, else xlsx]
        #[arg(long, value_enum)]
        format: Option<CliFormat>,

        /// Name of the origin column in multi-file runs [default: archivo_origen]
        #[arg(long)]
        origin_column: Option<String>,

        /// Add the origin column even for a single file
        #[arg(long)]
        force_origin: bool,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,

        /// Print first N rows to console
        #[arg(long)]
        show_rows: Option<usize>,
    },

    /// Show the headers of each sheet and where they resolve to
    Columns {
        /// Workbook files (.xlsx)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Mapping used to resolve the headers
        #[arg(long, default_value = "lp")]
        mapping: String,
    },

    /// Manage named mappings
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Show processing history, newest first
    History {
        /// Show at most N records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// List available mappings
    List,
    /// Print a mapping's entries
    Show { slug: String },
    /// Create an empty mapping
    Create { slug: String },
    /// Delete a mapping (lp and simbiu cannot be deleted)
    Delete { slug: String },
    /// Copy a mapping to a new name
    Clone { source: String, destination: String },
    /// Replace a mapping's entries (RAW=DEST pairs)
    Set {
        slug: String,
        #[arg(value_name = "RAW=DEST")]
        pairs: Vec<String>,
    },
    /// Write a mapping as JSON
    Export {
        slug: String,
        /// Output file [default: stdout]
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace a mapping with the entries of a JSON file
    Import { slug: String, input: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        match e.downcast_ref::<PipelineError>() {
            Some(pe) => eprintln!("Error: {}", pe.user_message()),
            None => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "sheet_unify=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let store = SqliteStore::open(&cli.store)?;

    match cli.command {
        Commands::Unify {
            files,
            mapping,
            document,
            overrides,
            output,
            format,
            origin_column,
            force_origin,
            quiet,
            show_rows,
        } => {
            // Start with library defaults and overlay user-specified values
            let defaults = PipelineConfig::default();
            let config = PipelineConfig {
                origin_column: origin_column.unwrap_or(defaults.origin_column.clone()),
                force_origin_column: force_origin,
                show_progress: !quiet,
                ..defaults
            };

            let workbooks = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<Result<Vec<_>, _>>()?;
            let document = document.as_deref().map(read_upload).transpose()?;
            let bundle = UploadedBundle::with_document_slug(
                workbooks,
                document,
                &mapping,
                &config.document_slug,
            )?;

            let mut pipeline = Pipeline::with_config(store, config);

            let submitted = if overrides.is_empty() {
                None
            } else {
                let mut merged = pipeline.store().load(&bundle.mapping_slug)?;
                merged.extend(parse_pairs(&overrides)?);
                Some(merged)
            };

            let unified = pipeline.build(bundle, submitted)?;

            let output = output.unwrap_or_else(|| PathBuf::from(&unified.output_name));
            let format = format
                .map(OutputFormat::from)
                .or_else(|| OutputFormat::from_path(&output))
                .unwrap_or(OutputFormat::Xlsx);
            write_table_file(&unified.table, &output, format)?;
            // History only lists outputs that exist.
            pipeline.record(&unified)?;

            if !quiet {
                print_summary(&unified.table);
                eprintln!("\nMapping: {}", unified.mapping_slug);
                eprintln!("Output: {}", output.display());
            }

            if let Some(limit) = show_rows {
                println!("\n=== Sample Rows ===");
                print_rows(&unified.table, Some(limit));
            }
        }

        Commands::Columns { files, mapping } => {
            let workbooks = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<Result<Vec<_>, _>>()?;
            let bundle = UploadedBundle::workbooks_only(workbooks, &mapping)?;
            let pipeline = Pipeline::new(store);

            println!("=== Mapping: {} ===", bundle.mapping_slug);
            for file in pipeline.columns(&bundle)? {
                println!("\n{}", file.filename);
                for sheet in file.sheets {
                    println!("  [{}]", sheet.sheet);
                    for header in sheet.headers {
                        let dest = if header.prefill.is_empty() {
                            "(dropped)".to_string()
                        } else {
                            header.prefill
                        };
                        println!("    {} -> {}", header.raw, dest);
                    }
                }
            }
        }

        Commands::Mappings { action } => run_mapping_action(store, action)?,

        Commands::History { limit } => {
            let records = store.read_all()?;
            let limit = limit.unwrap_or(records.len());

            println!("=== History ===");
            if records.is_empty() {
                println!("(empty)");
            }
            for record in records.iter().take(limit) {
                println!(
                    "{}  {:<16} {}",
                    record.timestamp, record.mapping_slug, record.output_name
                );
            }
        }
    }

    Ok(())
}

fn run_mapping_action(mut store: SqliteStore, action: MappingAction) -> Result<(), Box<dyn Error>> {
    match action {
        MappingAction::List => {
            for slug in store.list()? {
                println!("{}", slug);
            }
        }
        MappingAction::Show { slug } => {
            let mapping = store.load(&slug)?;
            if mapping.is_empty() {
                println!("(no entries; headers resolve to their canonical form)");
            }
            for (raw, dest) in &mapping {
                println!("{} -> {}  [{}]", raw, dest, canonicalize(raw));
            }
        }
        MappingAction::Create { slug } => {
            let slug = store.create(&slug).map_err(PipelineError::from)?;
            eprintln!("Created mapping '{}'", slug);
        }
        MappingAction::Delete { slug } => {
            store.delete(&slug).map_err(PipelineError::from)?;
            eprintln!("Deleted mapping '{}'", slug);
        }
        MappingAction::Clone {
            source,
            destination,
        } => {
            let slug = store
                .clone_mapping(&source, &destination)
                .map_err(PipelineError::from)?;
            eprintln!("Cloned '{}' into '{}'", source, slug);
        }
        MappingAction::Set { slug, pairs } => {
            let mapping = parse_pairs(&pairs)?;
            store.save(&slug, &mapping)?;
            eprintln!("Saved {} entries", mapping.len());
        }
        MappingAction::Export { slug, output } => {
            let json = serde_json::to_string_pretty(&store.load(&slug)?)?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
        }
        MappingAction::Import { slug, input } => {
            let mapping: Mapping = serde_json::from_str(&std::fs::read_to_string(input)?)?;
            store.save(&slug, &mapping)?;
            eprintln!("Imported {} entries", mapping.len());
        }
    }
    Ok(())
}

/// Read an uploaded file from disk, keeping its file name.
fn read_upload(path: &Path) -> Result<UploadedFile, std::io::Error> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(filename, bytes))
}
