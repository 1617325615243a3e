//! API Hub build-result ingestion.
//!
//! Validates builder output against its build config and a catalog snapshot,
//! and lifts it into entity records.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use apihub_ingest::{
    ArchiveIndex, Bucket, BuildConfig, CatalogError, InMemoryCatalog, IngestError, IngestOptions,
    Ingestor, ManifestSlot,
};
use apihub_telemetry::{LogFormat, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "apihub-ingest", about = "API Hub build-result ingestion", version)]
struct Cli {
    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, env = "APIHUB_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: json or pretty.
    #[arg(long, global = true, env = "APIHUB_LOG_FORMAT", default_value = "json")]
    log_format: String,

    /// Maximum decompressed size of one archive entry, in bytes.
    #[arg(long, global = true, default_value = "268435456")]
    max_entry_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct BuildInput {
    /// Build config JSON file.
    #[arg(long)]
    config: PathBuf,

    /// Build-result zip archive.
    #[arg(long)]
    result: PathBuf,

    /// Catalog snapshot JSON file. Without it the catalog is empty.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a build result (and optionally its sources) without lifting entities.
    Validate {
        #[command(flatten)]
        input: BuildInput,

        /// Sources zip archive to check against the build config files.
        #[arg(long)]
        sources: Option<PathBuf>,
    },

    /// Validate a build result and write the lifted entities as JSON.
    Ingest {
        #[command(flatten)]
        input: BuildInput,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the archive index: manifest slots and bucketed entries.
    Inspect {
        /// Zip archive to inspect.
        #[arg(long)]
        result: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_format = match LogFormat::parse(&cli.log_format) {
        Some(format) => format,
        None => {
            eprintln!("error: invalid log format '{}'", cli.log_format);
            return ExitCode::from(3);
        }
    };
    let telemetry = TelemetryConfig::new()
        .with_log_level(&cli.log_level)
        .with_log_format(log_format);
    if let Err(e) = apihub_telemetry::init(&telemetry) {
        eprintln!("error: {}", e);
        return ExitCode::from(3);
    }

    let options = IngestOptions::new().with_max_entry_size(cli.max_entry_size);
    let outcome = match &cli.command {
        Commands::Validate { input, sources } => run_validate(input, sources.as_deref(), options),
        Commands::Ingest { input, output } => run_ingest(input, output.as_deref(), options),
        Commands::Inspect { result } => run_inspect(result, &options),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// Print the failure and map it to an exit code.
///
/// 1: the archive was rejected, 2: catalog or infrastructure failure, 3: I/O.
fn report(error: &anyhow::Error) -> ExitCode {
    if let Some(ingest) = error.downcast_ref::<IngestError>() {
        if ingest.is_validation() {
            match serde_json::to_string_pretty(&ingest.to_record()) {
                Ok(record) => eprintln!("{record}"),
                Err(_) => eprintln!("error: {ingest}"),
            }
            return ExitCode::from(1);
        }
        eprintln!("error: {error:#}");
        return match ingest {
            IngestError::Io(_) | IngestError::Json(_) => ExitCode::from(3),
            _ => ExitCode::from(2),
        };
    }

    eprintln!("error: {error:#}");
    if error.downcast_ref::<CatalogError>().is_some() {
        ExitCode::from(2)
    } else {
        ExitCode::from(3)
    }
}

fn load_catalog(path: Option<&Path>) -> Result<InMemoryCatalog> {
    let Some(path) = path else {
        return Ok(InMemoryCatalog::new());
    };
    let catalog = InMemoryCatalog::load(path)?;
    tracing::debug!(
        path = %path.display(),
        versions = catalog.versions.len(),
        comparisons = catalog.comparisons.len(),
        "catalog snapshot loaded"
    );
    Ok(catalog)
}

fn load_config(path: &Path) -> Result<BuildConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read build config {}", path.display()))?;
    Ok(BuildConfig::from_json(&content)?)
}

fn read_archive(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read archive {}", path.display()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport<'a> {
    valid: bool,
    package_id: &'a str,
    version: &'a str,
    build_type: &'a str,
    sources_checked: bool,
}

fn run_validate(input: &BuildInput, sources: Option<&Path>, options: IngestOptions) -> Result<()> {
    let config = load_config(&input.config)?;
    let catalog = load_catalog(input.catalog.as_deref())?;
    let ingestor = Ingestor::new(&catalog).with_options(options);

    if let Some(sources) = sources {
        ingestor.validate_sources(read_archive(sources)?, &config)?;
    }

    let result = ingestor.open(read_archive(&input.result)?)?;
    let build_type = ingestor.validate(&result, &config)?;

    let report = ValidationReport {
        valid: true,
        package_id: &result.info().package_id,
        version: &result.info().version,
        build_type: build_type.as_str(),
        sources_checked: sources.is_some(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_ingest(input: &BuildInput, output: Option<&Path>, options: IngestOptions) -> Result<()> {
    let config = load_config(&input.config)?;
    let catalog = load_catalog(input.catalog.as_deref())?;
    let ingestor = Ingestor::new(&catalog).with_options(options);

    let lifted = ingestor.ingest(read_archive(&input.result)?, &config)?;
    let json = serde_json::to_string_pretty(&lifted)?;

    match output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            file.write_all(json.as_bytes())?;
            eprintln!(
                "ingested {} document(s), {} operation(s), {} comparison(s) to {}",
                lifted.documents.len(),
                lifted.operations.len(),
                lifted.version_comparisons.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexReport {
    manifests: Vec<&'static str>,
    documents: Vec<String>,
    operations: Vec<String>,
    comparisons: Vec<String>,
    uncategorized: Vec<String>,
}

fn names(bucket: &Bucket) -> Vec<String> {
    bucket.names().map(str::to_string).collect()
}

fn run_inspect(path: &Path, options: &IngestOptions) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let index = ArchiveIndex::new(file, options)?;

    let report = IndexReport {
        manifests: ManifestSlot::ALL
            .into_iter()
            .filter(|slot| index.manifest(*slot).is_some())
            .map(|slot| slot.file_name())
            .collect(),
        documents: names(index.document_files()),
        operations: names(index.operation_files()),
        comparisons: names(index.comparison_files()),
        uncategorized: names(index.uncategorized()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
