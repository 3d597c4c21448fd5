//! Stratsim Runner — config, indicator loading, batch orchestration, CSV export.
//!
//! This crate builds on `stratsim-core` to provide:
//! - TOML run configuration with builtin and custom strategies
//! - Loading of per-ticker indicator CSV tables, with an optional date window
//! - Parallel (ticker × strategy) batch runs with per-strategy simulations
//! - CSV export of trades, actions, simulations and the summary

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{
    ConfigError, CustomStrategyConfig, DataConfig, ResolvedConfig, RunSection, RunnerConfig,
};
pub use data_loader::{load_all, load_series, LoadError, LoadFailure, LoadedData};
pub use export::{rederive_alt_columns, save_outputs, strategy_slug};
pub use runner::{run_batch, run_series, BatchOptions, BatchResult, PairResult, RunError, SkippedRun};
