use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use pagestack::assessments::{export_assessments, AssessmentImporter, ASSESSMENT_FIELDNAMES};
use pagestack::exporter::{ContentExporter, ExportWriter};
use pagestack::importer::{ContentImporter, FileKind};
use pagestack::ordered_sets::{export_ordered_sets, OrderedSetImporter, ORDERED_SET_FIELDNAMES};
use pagestack::progress::ProgressSink;
use pagestack::repo::ContentStore;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// JSON file holding the content store.
    #[clap(short, long, global = true, default_value = "pagestack.json")]
    store: PathBuf,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FileFormat {
    Csv,
    Xlsx,
}

#[derive(Subcommand)]
enum Commands {
    /// Import content pages from a CSV or XLSX file.
    Import {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
        /// Delete existing pages first (only the target locale's when
        /// --locale is given).
        #[clap(long)]
        purge: bool,
        /// Import only rows for this locale.
        #[clap(long)]
        locale: Option<String>,
    },
    /// Export content pages to a CSV or XLSX file.
    Export {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
        /// Restrict the export to these page slugs. May repeat.
        #[clap(long)]
        slug: Vec<String>,
    },
    /// Import ordered content sets from a CSV or XLSX file.
    ImportSets {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
        #[clap(long)]
        purge: bool,
    },
    /// Export ordered content sets to a CSV or XLSX file.
    ExportSets {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
    },
    /// Import assessments from a CSV or XLSX file.
    ImportAssessments {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
        /// Delete existing assessments first (only the target locale's when
        /// --locale is given).
        #[clap(long)]
        purge: bool,
        /// Import only rows for this locale.
        #[clap(long)]
        locale: Option<String>,
    },
    /// Export assessments to a CSV or XLSX file.
    ExportAssessments {
        file: PathBuf,
        #[clap(long)]
        format: Option<FileFormat>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    let mut store = load_store(&args.store)?;
    match args.command {
        Commands::Import {
            file,
            format,
            purge,
            locale,
        } => {
            let content = read_file(&file)?;
            let importer = ContentImporter::new(content, resolve_kind(format, &file))
                .with_purge(purge)
                .with_locale(locale);
            run_with_progress(|sink| importer.perform_import(&mut store, sink))?;
            save_store(&args.store, &store)?;
            info!("imported content pages from {}", file.display());
        }
        Commands::Export { file, format, slug } => {
            let slugs = if slug.is_empty() { None } else { Some(slug) };
            let rows = ContentExporter::new(&store).with_slugs(slugs).perform_export();
            let writer = ExportWriter::content(&rows);
            write_file(&file, resolve_kind(format, &file), &writer)?;
            info!(rows = rows.len(), "exported content pages to {}", file.display());
        }
        Commands::ImportSets {
            file,
            format,
            purge,
        } => {
            let content = read_file(&file)?;
            let importer =
                OrderedSetImporter::new(content, resolve_kind(format, &file)).with_purge(purge);
            run_with_progress(|sink| importer.perform_import(&mut store, sink))?;
            save_store(&args.store, &store)?;
            info!("imported ordered content sets from {}", file.display());
        }
        Commands::ExportSets { file, format } => {
            let writer = ExportWriter::new(&ORDERED_SET_FIELDNAMES, export_ordered_sets(&store));
            write_file(&file, resolve_kind(format, &file), &writer)?;
            info!("exported ordered content sets to {}", file.display());
        }
        Commands::ImportAssessments {
            file,
            format,
            purge,
            locale,
        } => {
            let content = read_file(&file)?;
            let importer = AssessmentImporter::new(content, resolve_kind(format, &file))
                .with_purge(purge)
                .with_locale(locale);
            run_with_progress(|sink| importer.perform_import(&mut store, sink))?;
            save_store(&args.store, &store)?;
            info!("imported assessments from {}", file.display());
        }
        Commands::ExportAssessments { file, format } => {
            let writer = ExportWriter::new(&ASSESSMENT_FIELDNAMES, export_assessments(&store));
            write_file(&file, resolve_kind(format, &file), &writer)?;
            info!("exported assessments to {}", file.display());
        }
    }

    Ok(())
}

fn run_with_progress<E>(f: impl FnOnce(&mut dyn ProgressSink) -> Result<(), E>) -> Result<(), E> {
    let (mut tx, rx) = std::sync::mpsc::channel();
    let result = f(&mut tx);
    drop(tx);
    for percent in rx {
        debug!(percent, "import progress");
    }
    result
}

fn resolve_kind(format: Option<FileFormat>, file: &Path) -> FileKind {
    match format {
        Some(FileFormat::Csv) => FileKind::Csv,
        Some(FileFormat::Xlsx) => FileKind::Xlsx,
        None => match file.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xlsx") => FileKind::Xlsx,
            _ => FileKind::Csv,
        },
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_file(path: &Path, kind: FileKind, writer: &ExportWriter) -> Result<()> {
    let bytes = match kind {
        FileKind::Csv => writer.write_csv()?,
        FileKind::Xlsx => writer.write_xlsx()?,
    };
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn load_store(path: &Path) -> Result<ContentStore> {
    if !path.exists() {
        return Ok(ContentStore::default());
    }
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    ContentStore::from_json(&data)
        .with_context(|| format!("{} is not a valid store file", path.display()))
}

fn save_store(path: &Path, store: &ContentStore) -> Result<()> {
    let data = store.to_json().context("failed to serialise store")?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .without_time()
        .init();
}
