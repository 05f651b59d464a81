//! oxide-sync CLI
//!
//! Command-line tool for reconciling a database with a declarative schema.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use oxide_sync::prelude::*;

/// Declarative schema reconciliation for SQLite and PostgreSQL.
#[derive(Parser)]
#[command(name = "oxide-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    database: String,

    /// Enable debug output.
    #[arg(long, env = "DB_DEBUG")]
    debug: bool,

    #[command(flatten)]
    source: SchemaSource,

    #[command(subcommand)]
    command: Commands,
}

/// Where the schema declaration comes from.
#[derive(Args)]
struct SchemaSource {
    /// Schema text file.
    #[arg(short, long, conflicts_with_all = ["tables", "enums"])]
    schema: Option<PathBuf>,

    /// JSON document with the table definitions.
    #[arg(long, requires = "enums")]
    tables: Option<PathBuf>,

    /// JSON document with the enum definitions.
    #[arg(long, requires = "tables")]
    enums: Option<PathBuf>,
}

impl SchemaSource {
    fn load(&self) -> anyhow::Result<SchemaModel> {
        let model = match (&self.schema, &self.tables, &self.enums) {
            (Some(path), _, _) => parser::parse_file(path)
                .with_context(|| format!("Failed to load schema {}", path.display()))?,
            (None, Some(tables), Some(enums)) => parser::parse_json_files(tables, enums)
                .with_context(|| {
                    format!(
                        "Failed to load schema {} / {}",
                        tables.display(),
                        enums.display()
                    )
                })?,
            _ => bail!("No schema given: use --schema or --tables with --enums"),
        };
        Ok(model)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the database in line with the schema.
    Push {
        /// Drop and recreate every declared table first.
        #[arg(long)]
        force_reset: bool,

        /// Answer yes to every confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the schema as its two JSON documents.
    Dump {
        /// Output directory.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let model = cli.source.load()?;

    match cli.command {
        Commands::Push {
            force_reset,
            yes,
            dry_run,
        } => {
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let gate = if yes {
                SafetyGate::pre_authorized()
            } else {
                SafetyGate::new(StdinPrompt)
            };
            let options = SyncOptions::new()
                .force_reset(force_reset)
                .dry_run(dry_run);

            let report = match Backend::from_url(&cli.database)? {
                Backend::Sqlite => {
                    let driver = SqliteDriver::connect(&cli.database).await?;
                    push(driver, gate, options, &model).await?
                }
                Backend::Postgres => {
                    let driver = PostgresDriver::connect(&cli.database).await?;
                    push(driver, gate, options, &model).await?
                }
            };
            finish(&report)?;
        }

        Commands::Dump { out_dir } => dump(&model, &out_dir)?,
    }

    Ok(())
}

async fn push<D: Driver>(
    driver: D,
    gate: SafetyGate,
    options: SyncOptions,
    model: &SchemaModel,
) -> anyhow::Result<SyncReport> {
    let mut reconciler = Reconciler::new(driver, gate).options(options);
    let report = reconciler.run(model).await?;
    Ok(report)
}

fn finish(report: &SyncReport) -> anyhow::Result<()> {
    if report.dry_run {
        for sql in report.statements() {
            println!("{sql};");
        }
    }

    let declined = report
        .outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, TableOutcome::Declined { .. }))
        .count();
    if declined > 0 {
        warn!(declined, "Some tables were left divergent, re-run to apply");
    }

    if report.has_failures() {
        let tables: Vec<&str> = report.failures.iter().map(|f| f.table.as_str()).collect();
        bail!("Could not reconcile: {}", tables.join(", "));
    }
    info!(tables = report.outcomes.len(), "Schema is in sync");
    Ok(())
}

fn dump(model: &SchemaModel, out_dir: &Path) -> anyhow::Result<()> {
    let (tables, enums) = parser::to_json(model)?;
    std::fs::create_dir_all(out_dir)?;

    let tables_path = out_dir.join("schema.json");
    let enums_path = out_dir.join("schema.enum.json");
    std::fs::write(&tables_path, tables)?;
    std::fs::write(&enums_path, enums)?;

    info!("Wrote {}", tables_path.display());
    info!("Wrote {}", enums_path.display());
    Ok(())
}
