//! CLI command implementations.
//!
//! Reports are printed to stdout as pretty JSON; progress and diagnostics
//! go through `tracing` to stderr.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

use task_intake_core::schema::SchemaProvider;

use crate::config::Config;
use crate::import::{ImportOptions, ImportReport, ImportService};
use crate::uploads::IncomingFile;

/// Validate the config and list configured projects.
pub fn run_check(config: &Config) -> Result<()> {
    let provider = config.schema_provider()?;

    println!("Config OK");
    println!("  media root:      {}", config.storage.media_root.display());
    println!("  max tasks:       {}", config.limits.max_task_count);
    println!("  max total bytes: {}", config.limits.max_total_file_bytes);
    println!();
    println!("{:<10} {:<8} DATA FIELDS", "PROJECT", "FIELDS");
    for id in provider.project_ids() {
        let schema = provider.fields_of(id)?;
        let names: Vec<&str> = schema.field_names().collect();
        println!("{:<10} {:<8} {}", id, schema.len(), names.join(", "));
    }
    Ok(())
}

/// Print the target schema of one project.
pub fn run_schema(config: &Config, project_id: u64) -> Result<()> {
    let schema = config.schema_provider()?.fields_of(project_id)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn print_report(report: &ImportReport, emit_tasks: Option<&Path>) -> Result<()> {
    if let Some(path) = emit_tasks {
        let body = serde_json::to_string_pretty(&report.tasks)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write tasks to {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub async fn run_import(
    config: &Config,
    project_id: u64,
    paths: &[PathBuf],
    options: &ImportOptions,
    emit_tasks: Option<&Path>,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        files.push(IncomingFile::new(name, bytes));
    }

    let service = ImportService::from_config(config)?;
    let report = service.import_files(project_id, &files, options).await?;
    print_report(&report, emit_tasks)
}

pub async fn run_import_dir(
    config: &Config,
    project_id: u64,
    dir: &Path,
    options: &ImportOptions,
    emit_tasks: Option<&Path>,
) -> Result<()> {
    let service = ImportService::from_config(config)?;
    let report = service.import_directory(project_id, dir, options).await?;
    print_report(&report, emit_tasks)
}

/// Import a JSON payload from a file, or from stdin when `source` is `-`.
pub async fn run_inline(
    config: &Config,
    project_id: u64,
    source: &str,
    options: &ImportOptions,
    emit_tasks: Option<&Path>,
) -> Result<()> {
    let body = if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read {}", source))?
    };

    let service = ImportService::from_config(config)?;
    let report = service
        .import_inline_bytes(project_id, &body, options)
        .await?;
    print_report(&report, emit_tasks)
}
