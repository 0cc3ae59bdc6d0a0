use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use dossier_sync::config::{SourceConfig, SyncConfig};
use dossier_sync::logging::init_tracing;
use dossier_sync::sync::{BatchReport, ConnectionReport, SyncEngine};
use dossier_sync::{Result, SyncError};
use tracing::warn;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_PARTIAL: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    init_tracing(cli.verbose, cli.log_file.as_deref())?;
    match cli.command {
        Command::Sync(args) => execute_sync(args),
        Command::TestConnections(args) => execute_test_connections(args),
        Command::InitConfig { output } => execute_init_config(output),
    }
}

fn execute_sync(args: SyncArgs) -> Result<i32> {
    let mut config = args.config.load()?;
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(limit) = args.limit {
        config.limit = limit;
    }

    if !config.dry_run && !args.yes {
        let prompt = format!(
            "Update annotations of démarche {} for up to {} records?",
            config.destination.demarche_number, config.limit
        );
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            println!("Aborted.");
            return Ok(EXIT_SUCCESS);
        }
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    if let Err(err) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!(error = %err, "could not install the interrupt handler");
    }

    let engine = SyncEngine::connect(config)?.with_interrupt_flag(Arc::clone(&interrupt));
    let mut report = engine.run();
    report.interrupted |= interrupt.load(Ordering::SeqCst);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, engine.config().dry_run);
    }
    Ok(exit_code(&report))
}

fn execute_test_connections(args: ConfigArgs) -> Result<i32> {
    let config = args.load()?;
    let engine = SyncEngine::connect(config)?;
    let report = engine.test_connections();
    print_connections(&report);
    Ok(if report.is_ok() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

fn execute_init_config(output: PathBuf) -> Result<i32> {
    if output.exists() {
        return Err(SyncError::InvalidConfig(format!(
            "{} already exists",
            output.display()
        )));
    }
    SyncConfig::sample().save(&output)?;
    println!("Sample configuration written to {}", output.display());
    Ok(EXIT_SUCCESS)
}

fn exit_code(report: &BatchReport) -> i32 {
    if report.interrupted {
        EXIT_INTERRUPTED
    } else if !report.success {
        EXIT_FAILURE
    } else if report.errors == 0 {
        EXIT_SUCCESS
    } else if report.successful > 0 {
        EXIT_PARTIAL
    } else {
        EXIT_FAILURE
    }
}

fn print_connections(report: &ConnectionReport) {
    match &report.source {
        None => println!("source:      ok"),
        Some(error) => println!("source:      FAILED ({error})"),
    }
    match &report.destination {
        None => println!("destination: ok"),
        Some(error) => println!("destination: FAILED ({error})"),
    }
}

fn print_report(report: &BatchReport, dry_run: bool) {
    if dry_run {
        println!("Dry run: no annotation was modified.");
    }
    if !report.success {
        println!("Synchronisation failed:");
        for (kind, error) in report.batch_errors() {
            println!("  [{kind:?}] {error}");
        }
        return;
    }

    if let Some(compatibility) = &report.compatibility {
        println!(
            "Compatibility: {} compatible, {} need conversion, {} incompatible",
            compatibility.compatible_count,
            compatibility.needs_conversion_count,
            compatibility.incompatible_count
        );
        for entry in &compatibility.details {
            println!(
                "  {} -> {}: {} ({} -> {})",
                entry.column, entry.label, entry.compatibility, entry.source_type, entry.dest_type
            );
        }
    }

    println!(
        "Processed {} records: {} succeeded, {} failed in {:.2}s",
        report.processed,
        report.successful,
        report.errors,
        report.elapsed.as_secs_f64()
    );
    for outcome in report.failed_records() {
        let dossier = outcome
            .dossier_number
            .map(|number| number.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  record {} (dossier {dossier}):", outcome.record_id);
        for failure in &outcome.errors {
            println!("    - {failure}");
        }
    }
    if report.interrupted {
        println!("Interrupted: the remaining records were not processed.");
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Push Grist values onto Démarches Simplifiées private annotations."
)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, global = true)]
    verbose: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronise the pending records.
    Sync(SyncArgs),
    /// Check that both the source and Démarches Simplifiées answer.
    TestConnections(ConfigArgs),
    /// Write a sample configuration file.
    InitConfig {
        /// Destination of the sample file.
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Grist API key, overriding the configured one.
    #[arg(long, env = "GRIST_API_KEY", hide_env_values = true)]
    grist_token: Option<String>,

    /// Démarches Simplifiées API token, overriding the configured one.
    #[arg(long, env = "DS_API_TOKEN", hide_env_values = true)]
    ds_token: Option<String>,
}

impl ConfigArgs {
    fn load(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::load(&self.config)?;
        if let (Some(value), SourceConfig::Grist { token, .. }) =
            (&self.grist_token, &mut config.source)
        {
            *token = value.clone();
        }
        if let Some(value) = &self.ds_token {
            config.destination.token = value.clone();
        }
        Ok(config)
    }
}

#[derive(clap::Args)]
struct SyncArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Compute the updates without sending them.
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of records to process.
    #[arg(long)]
    limit: Option<usize>,

    /// Do not ask for confirmation.
    #[arg(long)]
    yes: bool,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}
