//! Stratsim CLI — run a strategy batch over indicator tables.
//!
//! Commands:
//! - `run` — load a TOML config, run every (ticker, strategy) pair, write CSVs
//! - `check` — validate a config and report what a run would load
//! - `strategies` — list built-in (and configured custom) strategies
//! - `alt-states` — recompute the `Alt` columns of an action table

mod obs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use stratsim_runner::data_loader::discover_tickers;
use stratsim_runner::{
    rederive_alt_columns, run_batch, save_outputs, BatchResult, RunnerConfig,
};

#[derive(Parser)]
#[command(
    name = "stratsim",
    about = "Stratsim CLI — rule-based strategy simulation over indicator tables"
)]
struct Cli {
    /// Log level or filter directive. `STRATSIM_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch from a TOML config file and write the result tables.
    Run {
        /// Path to a TOML config file. Without one, every default applies.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override `data.input_dir`.
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Override `data.output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Override `data.as_of` (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Run pairs on a single thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Validate a config file without running anything.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
    /// List available strategies and the indicator columns each one reads.
    Strategies {
        /// Include custom strategies declared in this config.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Recompute every `{strategy} Alt` column of an action table from its
    /// action labels, e.g. after editing the labels by hand.
    AltStates {
        /// Action table written by `run` (`actions/{ticker}.csv`).
        #[arg(long)]
        actions: PathBuf,

        /// Where to write the result. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    obs::init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Run {
            config,
            input_dir,
            output_dir,
            as_of,
            sequential,
        } => run_cmd(config.as_deref(), input_dir, output_dir, as_of, sequential),
        Commands::Check { config } => check_cmd(&config),
        Commands::Strategies { config } => strategies_cmd(config.as_deref()),
        Commands::AltStates { actions, output } => alt_states_cmd(&actions, output.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
    match path {
        Some(p) => RunnerConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(RunnerConfig::default()),
    }
}

fn run_cmd(
    config_path: Option<&Path>,
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    sequential: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = input_dir {
        config.data.input_dir = dir;
    }
    if let Some(dir) = output_dir {
        config.data.output_dir = dir;
    }
    if as_of.is_some() {
        config.data.as_of = as_of;
    }
    if sequential {
        config.run.parallel = false;
    }

    let resolved = config.resolve().context("invalid configuration")?;
    tracing::info!(
        fingerprint = %resolved.fingerprint,
        strategies = resolved.strategies.len(),
        input_dir = %resolved.config.data.input_dir.display(),
        "starting batch"
    );

    let batch = run_batch(&resolved).context("batch run failed")?;
    print_summary(&batch);

    let output_dir = &resolved.config.data.output_dir;
    let written = save_outputs(&batch, output_dir)?;
    println!(
        "{} files written to: {}",
        written.len(),
        output_dir.display()
    );
    Ok(())
}

fn print_summary(batch: &BatchResult) {
    println!(
        "Tickers: {}   Pairs run: {}   Skipped: {}",
        batch.series.len(),
        batch.pairs.len(),
        batch.skipped.len()
    );
    println!();
    println!(
        "{:<28} {:>7} {:>6} {:>8} {:>6} {:>12}",
        "Strategy", "Trades", "Open", "Win %", "Iters", "Sim Result"
    );
    println!("{}", "-".repeat(72));
    for sim in &batch.simulations {
        let s = &sim.summary;
        println!(
            "{:<28} {:>7} {:>6} {:>8.2} {:>6} {:>12.4}",
            s.strategy,
            s.total_trades,
            s.open_trades,
            s.win_rate,
            s.iteration_count,
            s.simulation_result
        );
    }
    println!();
}

fn check_cmd(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let resolved = config.resolve().context("invalid configuration")?;
    let data = &resolved.config.data;

    let tickers = if data.tickers.is_empty() {
        discover_tickers(&data.input_dir)
            .with_context(|| format!("cannot list {}", data.input_dir.display()))?
    } else {
        data.tickers.clone()
    };

    println!("Config OK: {}", path.display());
    println!("Fingerprint: {}", resolved.fingerprint);
    println!("Input dir:   {}", data.input_dir.display());
    println!("Output dir:  {}", data.output_dir.display());
    println!("Tickers:     {}", tickers.len());
    println!("Strategies:  {}", resolved.strategies.len());
    for spec in &resolved.strategies {
        println!("  {}", spec.name);
    }
    Ok(())
}

fn strategies_cmd(config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    // Listing shows everything available, not just the configured subset.
    config.run.strategies.clear();
    let resolved = config.resolve().context("invalid configuration")?;

    println!("{:<28} Columns", "Strategy");
    println!("{}", "-".repeat(72));
    for spec in &resolved.strategies {
        println!("{:<28} {}", spec.name, spec.required_columns().join(", "));
    }
    Ok(())
}

fn alt_states_cmd(actions: &Path, output: Option<&Path>) -> Result<()> {
    let table = std::fs::read_to_string(actions)
        .with_context(|| format!("failed to read {}", actions.display()))?;
    let rewritten = rederive_alt_columns(&table)
        .with_context(|| format!("cannot rederive alt states in {}", actions.display()))?;
    match output {
        Some(path) => {
            std::fs::write(path, rewritten)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "alt states written");
        }
        None => print!("{rewritten}"),
    }
    Ok(())
}
