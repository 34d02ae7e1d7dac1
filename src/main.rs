//! Flowlog CLI - flow-state journal on the command line

mod commands;

use clap::{Parser, Subcommand};
use commands::{AddArgs, AxisCommand, EditArgs, RenameCommand, ReportArgs};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "flowlog")]
#[command(version)]
#[command(about = "Flow-state journal - log how activities feel, find what works")]
#[command(long_about = r#"
Flowlog records reflections: what you were doing, whether you were in flow,
how engaged you were (0..100) and how it moved your energy (-100..100).
Reflections live under axes ("views") and can carry tags.

Example usage:
  flowlog add "Deep work" --engagement 85 --energy 20 --flow --tag solo
  flowlog list --axis Work
  flowlog report --by tag --metric combined
  flowlog export --output journal.tsv
"#)]
struct Cli {
    /// Path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to flowlog.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and write flowlog.toml
    Init {
        /// Overwrite an existing flowlog.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Log a reflection
    Add(AddArgs),

    /// Change fields of an existing reflection
    Edit {
        /// Reflection id
        id: i64,

        #[command(flatten)]
        fields: EditArgs,
    },

    /// Delete reflections by id
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// List reflections of an axis
    List {
        /// Axis to show (defaults to the active axis)
        #[arg(short, long)]
        axis: Option<String>,

        /// Maximum number of reflections
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage axes
    #[command(subcommand)]
    Axis(AxisCommand),

    /// Rename an activity or tag everywhere
    #[command(subcommand)]
    Rename(RenameCommand),

    /// Averages and best/worst rankings
    Report(ReportArgs),

    /// Export every reflection as tab-separated text
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a previous export
    Import {
        /// File to import
        path: PathBuf,
    },

    /// Move the database to another schema version
    Migrate {
        /// Target version (defaults to the latest)
        #[arg(long)]
        to: Option<u32>,
    },

    /// Show statistics about the journal
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    command: &'a str,
    data: T,
}

/// Print a JSON success envelope; a no-op in human mode
pub fn emit_success<T: Serialize>(mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let envelope = Envelope {
            ok: true,
            command,
            data,
        };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let ctx = commands::Context::resolve(cli.database, cli.config, output)?;

    let result = run(&ctx, cli.command).await;
    if let Err(err) = &result {
        if output.is_human() {
            flowlog::ui::error(&format!("{:#}", err));
            std::process::exit(1);
        }
    }
    result
}

async fn run(ctx: &commands::Context, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => commands::run_init(ctx, force),
        Commands::Migrate { to } => commands::run_migrate(ctx, to),
        Commands::Add(args) => {
            let store = ctx.open_store()?;
            commands::run_add(ctx, &store, args).await
        }
        Commands::Edit { id, fields } => {
            let store = ctx.open_store()?;
            commands::run_edit(ctx, &store, id, fields).await
        }
        Commands::Delete { ids } => {
            let store = ctx.open_store()?;
            commands::run_delete(ctx, &store, ids).await
        }
        Commands::List { axis, limit } => {
            let store = ctx.open_store()?;
            commands::run_list(ctx, &store, axis.as_deref(), limit).await
        }
        Commands::Axis(command) => {
            let store = ctx.open_store()?;
            commands::run_axis(ctx, &store, command).await
        }
        Commands::Rename(command) => {
            let store = ctx.open_store()?;
            commands::run_rename(ctx, &store, command).await
        }
        Commands::Report(args) => {
            let store = ctx.open_store()?;
            commands::run_report(ctx, &store, args).await
        }
        Commands::Export { output } => {
            let store = ctx.open_store()?;
            commands::run_export(ctx, &store, output).await
        }
        Commands::Import { path } => {
            let store = ctx.open_store()?;
            commands::run_import(ctx, &store, &path).await
        }
        Commands::Stats => {
            let store = ctx.open_store()?;
            commands::run_stats(ctx, &store).await
        }
    }
}
