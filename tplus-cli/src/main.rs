//! tplus CLI: run, validate and batch commands.
//!
//! Commands:
//! - `run`: execute one backtest from a TOML config and save its artifacts
//! - `validate`: parse and check a config without touching market data
//! - `batch`: run several configs in parallel

mod logging;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tplus_runner::data_loader::parse_date;
use tplus_runner::{run_backtest, run_batch, save_artifacts, summary, RunConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tplus", about = "tplus: T+1 equity backtesting engine")]
struct Cli {
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Override the config's data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override the start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Override the end date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the full JSON report instead of the text summary.
        #[arg(long, default_value_t = false)]
        print_json: bool,
    },
    /// Parse and validate a config file.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run several configs in parallel.
    Batch {
        /// Config files.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Override every config's data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.json)?;

    match cli.command {
        Commands::Run {
            config,
            data_dir,
            start,
            end,
            output_dir,
            print_json,
        } => run_cmd(&config, data_dir, start, end, &output_dir, print_json),
        Commands::Validate { config } => validate_cmd(&config),
        Commands::Batch {
            configs,
            data_dir,
            output_dir,
        } => batch_cmd(&configs, data_dir, &output_dir),
    }
}

fn load_config(path: &Path, data_dir: Option<&PathBuf>) -> Result<RunConfig> {
    let mut config = RunConfig::from_file(path)?;
    if let Some(dir) = data_dir {
        config.data.dir = dir.clone();
    }
    Ok(config)
}

fn parse_date_arg(flag: &str, text: &str) -> Result<NaiveDate> {
    match parse_date(text) {
        Some(date) => Ok(date),
        None => bail!("--{flag}: cannot parse date '{text}'"),
    }
}

fn run_cmd(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    output_dir: &Path,
    print_json: bool,
) -> Result<()> {
    let mut config = load_config(config_path, data_dir.as_ref())?;
    if let Some(start) = start {
        config.start_date = parse_date_arg("start", &start)?;
    }
    if let Some(end) = end {
        config.end_date = parse_date_arg("end", &end)?;
    }

    let report = run_backtest(&config)
        .with_context(|| format!("backtest failed for {}", config_path.display()))?;

    if print_json {
        println!("{}", tplus_runner::export_json(&report)?);
    } else {
        print!("{}", summary(&report));
    }

    let run_dir = save_artifacts(&report, output_dir)?;
    info!(dir = %run_dir.display(), "artifacts saved");
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    config.validate()?;
    println!("{}: ok (run id {})", config_path.display(), config.run_id()?);
    Ok(())
}

fn batch_cmd(paths: &[PathBuf], data_dir: Option<PathBuf>, output_dir: &Path) -> Result<()> {
    let configs = paths
        .iter()
        .map(|p| load_config(p, data_dir.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut failures = 0usize;
    for (path, outcome) in paths.iter().zip(run_batch(&configs)) {
        match outcome {
            Ok(report) => {
                let run_dir = save_artifacts(&report, output_dir)?;
                println!(
                    "{:<40} {:<16} total {}  -> {}",
                    path.display(),
                    report.strategy,
                    report.result.total_value,
                    run_dir.display()
                );
            }
            Err(e) => {
                failures += 1;
                error!(config = %path.display(), error = %e, "run failed");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} runs failed", paths.len());
    }
    Ok(())
}
