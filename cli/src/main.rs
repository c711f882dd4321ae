//! sieve - checkpointed ledger identity scans and position significance analysis.
//!
//! ```text
//! sieve scan     candidates -> codec -> ledger -> checkpoint -> results.json | manifest + shards
//! sieve analyze  results | labels -> per-position chi-square -> statistical_report.{json,md}
//! sieve derive   body... -> identity + public key
//! ```
//!
//! Exit status is 0 when a scan completes or stops cleanly on request, and 1 on
//! any setup or I/O failure.

mod input;

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sieve_engine::{RunOutcome, SieveConfig};
use sieve_stats::Correction;

const LOG_FILE: &str = "sieve.log";

/// sieve - ledger identity scanner
#[derive(Parser, Debug)]
#[command(name = "sieve")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode candidates and check each identity against the ledger (resumable)
    Scan(ScanArgs),

    /// Test identity positions for association with on-ledger existence
    Analyze(AnalyzeArgs),

    /// Print the identity and public key for one or more 56-character bodies
    Derive {
        /// Candidate bodies
        #[arg(required = true)]
        bodies: Vec<String>,
    },
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Candidate file (.txt one per line, or one of the JSON layouts)
    #[arg(long)]
    candidates: PathBuf,

    /// Output directory for checkpoint, results and log
    #[arg(long)]
    out: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist progress every N candidates
    #[arg(long)]
    checkpoint_interval: Option<usize>,

    /// Minimum delay between ledger calls, in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,

    /// Stop cleanly when this file appears
    #[arg(long)]
    stop_file: Option<PathBuf>,

    /// Ledger RPC base URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Concurrent ledger calls (1-4)
    #[arg(long)]
    max_in_flight: Option<usize>,
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Run directory, results.json / manifest.json, or a labels JSON file
    #[arg(long)]
    input: PathBuf,

    /// Directory for statistical_report.json and statistical_report.md
    #[arg(long)]
    out: PathBuf,

    /// TOML configuration file ([analysis] section)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Significance level
    #[arg(long)]
    alpha: Option<f64>,

    /// Positions to test, e.g. 0-59 or 4,27,30
    #[arg(long, value_parser = input::parse_positions)]
    positions: Option<input::Positions>,

    /// Positions fixed before looking at the data; judged without correction
    #[arg(long, value_parser = input::parse_positions)]
    pre_specified: Option<input::Positions>,

    /// Correction for exploratory positions
    #[arg(long)]
    correction: Option<Correction>,
}

fn init_tracing(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (log_file, init_warning) = match log_dir.map(open_log_file) {
        Some(Ok((path, file))) => (Some((path, file)), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::debug!(path = %log_path.display(), "Logging initialized");
        return;
    }

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(env_filter)
        .init();
    if let Some(warning) = init_warning {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(dir: &Path) -> Result<(PathBuf, fs::File), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log dir {}: {e}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map(|file| (path.clone(), file))
        .map_err(|e| format!("Failed to open log file {}: {e}", path.display()))
}

/// Cancel `token` on Ctrl-C so the run checkpoints and exits cleanly.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work");
            token.cancel();
        }
    });
}

async fn run_scan(args: ScanArgs) -> Result<()> {
    let mut config = SieveConfig::load(args.config.as_deref()).context("invalid configuration")?;
    if let Some(n) = args.checkpoint_interval {
        config.scan.checkpoint_interval = n;
    }
    if let Some(ms) = args.rate_limit_ms {
        config.ledger.rate_limit_ms = ms;
    }
    if let Some(path) = args.stop_file {
        config.scan.stop_file = Some(path);
    }
    if let Some(url) = args.rpc_url {
        config.ledger.rpc_url = url;
    }
    if let Some(n) = args.max_in_flight {
        config.scan.max_in_flight = n;
    }
    config.validate().context("invalid configuration")?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let outcome = sieve_engine::scan(&config, &args.candidates, &args.out, cancel)
        .await
        .context("scan failed")?;

    match outcome {
        RunOutcome::Completed { summary, output } => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!("results: {}", output.entry_point().display());
        }
        RunOutcome::Interrupted { processed, total } => {
            println!("interrupted after {processed}/{total}; rerun the same command to resume");
        }
    }
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = SieveConfig::load(args.config.as_deref()).context("invalid configuration")?;
    let analysis = &mut config.analysis;
    if let Some(alpha) = args.alpha {
        analysis.alpha = alpha;
    }
    if let Some(input::Positions(positions)) = args.positions {
        analysis.positions = positions;
    }
    if let Some(input::Positions(pre)) = args.pre_specified {
        analysis.pre_specified = pre;
    }
    if let Some(correction) = args.correction {
        analysis.correction = correction;
    }

    let labeled = input::load_labeled(&args.input)?;
    if labeled.samples.is_empty() {
        bail!("no labeled identities in {}", args.input.display());
    }
    let report = labeled.analyze(&config.analysis)?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let (json_path, md_path) = report
        .write(&args.out)
        .with_context(|| format!("failed to write report into {}", args.out.display()))?;

    println!(
        "{} samples, {} positions tested, significant: {:?}",
        report.sample_size,
        report.family_size,
        report.significant_positions()
    );
    println!("report: {} / {}", json_path.display(), md_path.display());
    Ok(())
}

fn run_derive(bodies: &[String]) -> Result<()> {
    let mut failures = 0;
    for body in bodies {
        match sieve_codec::derive_identity(body) {
            Ok(derived) => println!("{}  {}", derived.identity, derived.public_key.to_hex()),
            Err(e) => {
                eprintln!("{body}: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} bodies could not be decoded", bodies.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Scan(args) => Some(args.out.as_path()),
        Commands::Analyze(args) => Some(args.out.as_path()),
        Commands::Derive { .. } => None,
    };
    init_tracing(log_dir);

    match cli.command {
        Commands::Scan(args) => run_scan(args).await,
        Commands::Analyze(args) => run_analyze(args),
        Commands::Derive { bodies } => run_derive(&bodies),
    }
}
