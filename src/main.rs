// 🎓 roster-sync - Reconcile a student extract into the roster database

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use roster_sync::logging::{init_logging, LogConfig, LogFormat};
use roster_sync::{
    BootstrapError, CsvRecordSource, ReconciliationReport, Reconciler, RecordOutcome,
    SqliteRosterStore, SyncConfig,
};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser)]
#[command(
    name = "roster-sync",
    version,
    about = "Reconcile an upstream student extract against the roster database"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile a CSV extract into the roster
    Sync(SyncArgs),

    /// Create the database, seed year levels and register a school
    Init(InitArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Student extract (CSV with header row)
    #[arg(value_name = "CSV")]
    csv: PathBuf,

    #[arg(long, value_name = "PATH", default_value = "roster.db")]
    db: PathBuf,

    /// School to reconcile; required when more than one exists
    #[arg(long, value_name = "ID")]
    school: Option<i64>,

    /// Match on student code alone
    #[arg(long = "no-extended-check")]
    no_extended_check: bool,

    /// Mark roster entries missing from the extract as deleted
    #[arg(long = "soft-delete")]
    soft_delete: bool,

    /// Report what would change without writing
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// JSON settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the full run report as JSON
    #[arg(long = "report-json", value_name = "PATH")]
    report_json: Option<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    #[arg(long, value_name = "PATH", default_value = "roster.db")]
    db: PathBuf,

    #[arg(long = "school-name", value_name = "NAME")]
    school_name: String,

    #[arg(long, value_name = "LOC", default_value = "")]
    location: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    init_logging(
        &LogConfig::from_flags(cli.verbose, cli.quiet)
            .with_format(format)
            .with_ansi(io::stderr().is_terminal()),
    );

    match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Init(args) => run_init(args),
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_sync(args: SyncArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if args.school.is_some() {
        config.school_id = args.school;
    }
    if args.no_extended_check {
        config.extended_identity_check = false;
    }
    if args.soft_delete {
        config.soft_delete = true;
    }
    if args.dry_run {
        config.dry_run = true;
    }

    let store = SqliteRosterStore::open(&args.db, &config.actor).map_err(BootstrapError::store)?;
    let source = CsvRecordSource::from_path(&args.csv).map_err(BootstrapError::source)?;

    let reconciler = Reconciler::new(config);
    let report = reconciler.run(&store, &source)?;

    match store.last_run_digest(report.school_id) {
        Ok(Some(previous)) if report.source_digest.as_deref() == Some(previous.as_str()) => {
            tracing::info!(digest = %previous, "extract is identical to the previous run");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to read run history"),
    }

    if !report.dry_run {
        if let Err(e) = store.record_run(&report) {
            tracing::warn!(run_id = %report.run_id, error = %e, "failed to record run history");
        }
    }

    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    print_summary(&report);

    Ok(())
}

fn run_init(args: InitArgs) -> Result<()> {
    let store = SqliteRosterStore::open(&args.db, roster_sync::config::DEFAULT_ACTOR)?;

    let added = store.seed_year_levels()?;
    let school_id = store.add_school(&args.school_name, &args.location)?;

    println!("🗄️  Roster database ready: {}", args.db.display());
    println!("✓ {} year levels added", added);
    println!("✓ School '{}' registered with id {}", args.school_name, school_id);

    Ok(())
}

fn print_summary(report: &ReconciliationReport) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for entry in report.rejections() {
        if let RecordOutcome::Rejected { error, content } = &entry.outcome {
            println!("❌ line {}: {}", entry.line_number, error);
            println!("   {}", content);
        }
    }

    if report.errored == 0 {
        println!("✅ {} records processed", report.processed());
    }
}
