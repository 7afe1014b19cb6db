// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heures_core::import::preview_file;
use heures_core::sheet::DEFAULT_PREVIEW_ROWS;
use heures_core::store::SessionFilter;
use heures_core::{
    export, AppConfig, ColumnMapping, CsvSheetReader, HoursService, ImportMode, ImportOptions,
    Importer, JsonFileStore,
};

/// Teaching hours: imports, per-teacher totals and overtime.
#[derive(Debug, Parser)]
#[command(name = "heures", version)]
struct Cli {
    /// Data file, overrides HEURES_DATA_FILE.
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import teachers and their planned hours from a CSV sheet.
    ImportTeachers {
        file: PathBuf,
        /// Column mapping as JSON, e.g. {"enseignantCol": "Nom"}.
        #[arg(long)]
        mapping: Option<String>,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Import sessions from a CSV sheet.
    ImportCourses {
        file: PathBuf,
        #[arg(long)]
        mapping: Option<String>,
        /// Create teachers that cannot be matched by name.
        #[arg(long)]
        create_missing: bool,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Show the headers and first rows of a sheet.
    Preview {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        rows: usize,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// List teachers with derived hours.
    Teachers,
    /// One teacher with its sessions grouped by context.
    Teacher { id: u64 },
    /// Delete a teacher and all of its sessions.
    DeleteTeacher { id: u64 },
    /// Global and per-type statistics.
    Stats,
    /// Write the teacher summary as CSV.
    ExportTeachers { out: PathBuf },
    /// Write every session as CSV.
    ExportSessions { out: PathBuf },
}

fn reader_for(delimiter: char) -> Result<CsvSheetReader> {
    if !delimiter.is_ascii() {
        bail!("Delimiter must be a single ASCII character, got '{}'", delimiter);
    }
    Ok(CsvSheetReader::with_delimiter(delimiter as u8))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(path) = cli.data_file {
        config.data_file = path;
    }

    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Using data file {}", config.data_file.display());
    let store = Arc::new(
        JsonFileStore::open(&config.data_file)
            .with_context(|| format!("Failed to open {}", config.data_file.display()))?,
    );
    let service = HoursService::new(Arc::clone(&store));

    match cli.command {
        Command::ImportTeachers {
            file,
            mapping,
            delimiter,
        } => {
            let options = ImportOptions {
                mode: ImportMode::TeacherImport,
                create_missing: false,
                mapping: ColumnMapping::from_json(mapping.as_deref().unwrap_or_default())?,
            };
            let report = Importer::new(store.as_ref(), config.default_planned_hours)
                .import_file(&reader_for(delimiter)?, &file, &options)
                .await?;
            print_json(&report)?;
        }
        Command::ImportCourses {
            file,
            mapping,
            create_missing,
            delimiter,
        } => {
            let options = ImportOptions {
                mode: ImportMode::CourseImport,
                create_missing,
                mapping: ColumnMapping::from_json(mapping.as_deref().unwrap_or_default())?,
            };
            let report = Importer::new(store.as_ref(), config.default_planned_hours)
                .import_file(&reader_for(delimiter)?, &file, &options)
                .await?;
            print_json(&report)?;
        }
        Command::Preview {
            file,
            rows,
            delimiter,
        } => {
            let preview = preview_file(&reader_for(delimiter)?, &file, rows)?;
            print_json(&preview)?;
        }
        Command::Teachers => {
            print_json(&service.list_teachers().await?)?;
        }
        Command::Teacher { id } => {
            print_json(&service.teacher_report(id).await?)?;
        }
        Command::DeleteTeacher { id } => {
            print_json(&service.delete_teacher(id).await?)?;
        }
        Command::Stats => {
            print_json(&service.global_stats().await?)?;
        }
        Command::ExportTeachers { out } => {
            let reports = service.list_teachers().await?;
            let file = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            export::write_teacher_summaries(file, &reports)?;
            info!("Wrote {} teachers to {}", reports.len(), out.display());
        }
        Command::ExportSessions { out } => {
            let sessions = service.list_sessions(&SessionFilter::default()).await?;
            let file = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            export::write_sessions(file, &sessions)?;
            info!("Wrote {} sessions to {}", sessions.len(), out.display());
        }
    }

    Ok(())
}
