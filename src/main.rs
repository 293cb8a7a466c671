use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{ConfigError, Settings};
use database::DbError;
use importer::{ImportCheckpoint, ImportEngine, ImportError, ImportStatus, PgProductSink};
use indicatif::{ProgressBar, ProgressStyle};
use migrator::{builtin_units, Ledger, MigratorError};
use sqlx::PgPool;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// The main entry point for the pantry data-backend bootstrap tool.
#[tokio::main]
async fn main() {
    // Load environment variables from a .env file when present.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Provisions the product database: schema migrations and bulk imports.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending schema migrations.
    Migrate,
    /// Stream a product dump (JSONL, optionally gzipped) into the database.
    Import(ImportArgs),
    /// Roll back the most recently applied migration.
    Rollback,
    /// Report pending migrations and the current import checkpoint.
    Status,
}

#[derive(Parser)]
struct ImportArgs {
    /// Path or http(s) URL of the product dump (.jsonl or .jsonl.gz).
    source: String,

    /// Records per transaction; overrides the configured value.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Discard any persisted checkpoint and start from record 0.
    #[arg(long)]
    fresh: bool,
}

// ==============================================================================
// Error class and exit codes
// ==============================================================================

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Migration(#[from] MigratorError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl CliError {
    /// Distinct exit codes per failure class, for scripting around the tool.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Database(_) => 3,
            CliError::Migration(_) => 4,
            CliError::Import(_) => 5,
        }
    }
}

// ==============================================================================
// Orchestration
// ==============================================================================

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = configuration::load_settings()?;
    let url = settings.database.resolve_url()?;

    // The gate runs before any pooled connection is handed out: a container's
    // process start does not mean it is accepting connections yet.
    database::wait_for_database(&url, &settings.readiness).await?;

    let pool = database::connect(&url, &settings.database).await?;
    let result = dispatch(cli.command, &pool, &settings).await;
    database::close(&pool).await;
    result
}

async fn dispatch(command: Commands, pool: &PgPool, settings: &Settings) -> Result<(), CliError> {
    match command {
        Commands::Migrate => handle_migrate(pool).await,
        Commands::Import(args) => handle_import(args, pool, settings).await,
        Commands::Rollback => handle_rollback(pool).await,
        Commands::Status => handle_status(pool, settings).await,
    }
}

async fn handle_migrate(pool: &PgPool) -> Result<(), CliError> {
    let units = builtin_units();
    let report = migrator::apply_pending(pool, &units).await?;

    if report.applied.is_empty() {
        println!("Schema is up to date ({} units applied previously).", units.len());
    } else {
        for (version, name) in &report.applied {
            println!("Applied migration {version}: {name}");
        }
        println!("{} of {} pending units applied.", report.applied.len(), report.pending_before);
    }
    Ok(())
}

async fn handle_rollback(pool: &PgPool) -> Result<(), CliError> {
    let units = builtin_units();
    match migrator::rollback_last(pool, &units).await? {
        Some((version, name)) => println!("Rolled back migration {version}: {name}"),
        None => println!("Nothing to roll back: the ledger is empty."),
    }
    Ok(())
}

async fn handle_import(
    args: ImportArgs,
    pool: &PgPool,
    settings: &Settings,
) -> Result<(), CliError> {
    // The importer assumes a current schema; bring it up to date first.
    let units = builtin_units();
    migrator::apply_pending(pool, &units).await?;

    // Remote dumps are downloaded to a temp file first; the handle must stay
    // alive until the run is over.
    let _download;
    let lines = if importer::is_remote(&args.source) {
        let file = importer::fetch_remote(&args.source).await?;
        let lines = importer::open_lines(file.path()).map_err(ImportError::Source)?;
        _download = Some(file);
        lines
    } else {
        _download = None;
        importer::open_lines(Path::new(&args.source)).map_err(ImportError::Source)?
    };
    let source_label = args.source.clone();
    let batch_size = args.batch_size.unwrap_or(settings.import.batch_size);

    // Ctrl-C flips the cancellation flag; the engine observes it at the next
    // batch boundary and pauses with the checkpoint persisted.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, pausing after the in-flight batch");
            let _ = cancel_tx.send(true);
        }
    });

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} records committed ({per_sec})")
    {
        bar.set_style(style);
    }
    let progress_bar = bar.clone();

    let sink = PgProductSink::new(pool.clone());
    let mut engine = ImportEngine::new(sink, batch_size, &settings.import.checkpoint_path)
        .with_progress(move |committed| progress_bar.set_position(committed));

    let summary = engine
        .run(&source_label, lines, args.fresh, cancel_rx)
        .await?;
    bar.finish_and_clear();

    match summary.status {
        ImportStatus::Completed => println!("Import complete."),
        ImportStatus::Paused => println!(
            "Import paused at record {}; re-run the same command to resume.",
            summary.last_index
        ),
    }
    println!(
        "  imported: {}\n  skipped: {}\n  duplicates overwritten: {}",
        summary.imported, summary.skipped, summary.overwritten
    );
    Ok(())
}

async fn handle_status(pool: &PgPool, settings: &Settings) -> Result<(), CliError> {
    let units = builtin_units();
    let ledger = Ledger::new(pool);
    ledger.ensure_table().await.map_err(CliError::Migration)?;
    let applied = ledger.applied_versions().await.map_err(CliError::Migration)?;
    let pending = migrator::pending(&units, &applied);

    let mut table = Table::new();
    table.set_header(vec!["Version", "Name", "Status"]);
    for unit in &units {
        let status = if applied.contains(&unit.version) {
            "applied"
        } else {
            "pending"
        };
        table.add_row(vec![unit.version.to_string(), unit.name.to_string(), status.to_string()]);
    }
    println!("{table}");
    println!(
        "{} applied, {} pending.",
        applied.len(),
        pending.len()
    );

    let checkpoint_path = PathBuf::from(&settings.import.checkpoint_path);
    match ImportCheckpoint::load(&checkpoint_path).map_err(CliError::Import)? {
        Some(cp) => println!(
            "Import checkpoint: run {} on {} at record {} ({} imported, {} skipped, {} overwritten).",
            cp.run_id, cp.source, cp.next_index, cp.imported, cp.skipped, cp.overwritten
        ),
        None => println!("No import checkpoint: no import is in progress."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_failure_class() {
        let config = CliError::Config(ConfigError::MissingDatabaseUrl);
        let db = CliError::Database(DbError::Unavailable {
            waited_secs: 60,
            last_error: "connection refused".to_string(),
        });
        let migration = CliError::Migration(MigratorError::LedgerCorruption("gap".to_string()));
        let import = CliError::Import(ImportError::CheckpointMismatch);

        let codes = [
            config.exit_code(),
            db.exit_code(),
            migration.exit_code(),
            import.exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }
}
