//! # Task Intake CLI (`intake`)
//!
//! Imports labeling tasks from files, directories, and JSON payloads into a
//! project, validating them against the project's labeling config.
//!
//! ## Usage
//!
//! ```bash
//! intake --config ./config/intake.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `intake check` | Validate the config and list projects |
//! | `intake schema --project <id>` | Print a project's data fields |
//! | `intake import --project <id> <files>...` | Upload files and create tasks |
//! | `intake import-dir --project <id> <dir>` | Upload a directory and create tasks |
//! | `intake inline --project <id> <path or ->` | Create tasks from a JSON payload |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use task_intake::import::ImportOptions;
use task_intake::{commands, config, logging};

/// Task Intake CLI: turn uploaded files into labeling tasks.
#[derive(Parser)]
#[command(
    name = "intake",
    about = "Task Intake: turn uploaded files and JSON payloads into labeling tasks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/intake.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every import command.
#[derive(clap::Args)]
struct ImportArgs {
    /// Target project id.
    #[arg(long)]
    project: u64,

    /// Id of the uploading user.
    #[arg(long, default_value_t = 1)]
    user: u64,

    /// Read CSV, TSV and TXT files as one task each instead of one task
    /// per row or line.
    #[arg(long)]
    no_list: bool,

    /// Parse and report without creating tasks.
    #[arg(long)]
    dry_run: bool,

    /// Include the ids of created tasks in the report.
    #[arg(long)]
    task_ids: bool,

    /// Also write the parsed tasks as a JSON array to this path.
    #[arg(long)]
    emit_tasks: Option<PathBuf>,
}

impl ImportArgs {
    fn options(&self) -> ImportOptions {
        ImportOptions {
            user_id: self.user,
            treat_tabular_as_list: self.no_list.then_some(false),
            commit: !self.dry_run,
            return_task_ids: self.task_ids,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list configured projects.
    Check,

    /// Print the data fields declared by a project's labeling config.
    Schema {
        #[arg(long)]
        project: u64,
    },

    /// Upload files and create tasks from them.
    Import {
        #[command(flatten)]
        args: ImportArgs,

        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upload every supported file below a directory and create tasks.
    ImportDir {
        #[command(flatten)]
        args: ImportArgs,

        /// Directory to upload.
        dir: PathBuf,
    },

    /// Create tasks from a JSON payload (object or array).
    Inline {
        #[command(flatten)]
        args: ImportArgs,

        /// Payload file, or `-` for stdin.
        source: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check => {
            commands::run_check(&cfg)?;
        }
        Commands::Schema { project } => {
            commands::run_schema(&cfg, project)?;
        }
        Commands::Import { args, files } => {
            commands::run_import(
                &cfg,
                args.project,
                &files,
                &args.options(),
                args.emit_tasks.as_deref(),
            )
            .await?;
        }
        Commands::ImportDir { args, dir } => {
            commands::run_import_dir(
                &cfg,
                args.project,
                &dir,
                &args.options(),
                args.emit_tasks.as_deref(),
            )
            .await?;
        }
        Commands::Inline { args, source } => {
            commands::run_inline(
                &cfg,
                args.project,
                &source,
                &args.options(),
                args.emit_tasks.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}
