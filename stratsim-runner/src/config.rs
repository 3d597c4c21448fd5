//! Serializable run configuration.
//!
//! A run is described by one TOML file with four sections, every field
//! optional:
//!
//! ```toml
//! [data]
//! input_dir = "data"
//! output_dir = "results"
//! tickers = []            # empty = discover indicators_*.csv
//! lookback_days = 365
//! as_of = "2024-12-31"
//!
//! [commission]
//! entry_rate = 0.0006
//! exit_rate = 0.0006
//!
//! [run]
//! strategies = []         # empty = every built-in plus every custom strategy
//! parallel = true
//! partition_scope = "merged"
//!
//! [[custom_strategy]]
//! name = "RSI 30/70"
//! buy_rules = [{ indicator = "RSI_14", operator = "<", target = 30.0 }]
//! sell_rules = [{ indicator = "RSI_14", operator = ">", target = 70.0 }]
//! atr_multiplier = 1.5
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use stratsim_core::domain::CommissionModel;
use stratsim_core::engine::PartitionScope;
use stratsim_core::strategy::{
    builtin_strategies, AtrStop, Rule, SpecError, StopPolicy, StrategySpec, DEFAULT_ATR_COLUMN,
    DEFAULT_SECONDARY_STOP_PCT, DEFAULT_TAKE_PROFIT_PCT,
};

use crate::export::strategy_slug;

/// Content hash of a resolved configuration.
pub type ConfigFingerprint = String;

/// Errors from loading or validating a configuration. These are the only
/// fatal errors of a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("strategy name '{0}' is declared more than once")]
    DuplicateStrategy(String),

    #[error("strategy '{name}' would write to the same output files as '{other}'")]
    OutputNameCollision { name: String, other: String },

    #[error("strategy name '{0}' has no letters or digits to name its output files")]
    UnnamedOutput(String),

    #[error("invalid strategy '{name}': {source}")]
    InvalidStrategy {
        name: String,
        #[source]
        source: SpecError,
    },

    #[error("commission {field} must be in [0, 1), got {value}")]
    InvalidCommission { field: &'static str, value: f64 },

    #[error("lookback_days must be at least 1")]
    InvalidLookback,

    #[error("failed to fingerprint config: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Where indicator tables come from and where results go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Tickers to load. Empty means every `indicators_*.csv` in `input_dir`.
    pub tickers: Vec<String>,
    /// Keep only bars newer than `as_of - lookback_days`.
    pub lookback_days: Option<u32>,
    /// Reference date for the window. Defaults to each ticker's newest bar.
    pub as_of: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("results"),
            tickers: Vec::new(),
            lookback_days: None,
            as_of: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    /// Strategy names to run. Empty means all built-ins and all custom strategies.
    pub strategies: Vec<String>,
    /// Run (ticker, strategy) pairs on the rayon pool.
    pub parallel: bool,
    pub partition_scope: PartitionScope,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
            parallel: true,
            partition_scope: PartitionScope::Merged,
        }
    }
}

fn default_secondary_stop() -> Option<f64> {
    Some(DEFAULT_SECONDARY_STOP_PCT)
}

fn default_take_profit() -> Option<f64> {
    Some(DEFAULT_TAKE_PROFIT_PCT)
}

fn default_atr_column() -> String {
    DEFAULT_ATR_COLUMN.to_string()
}

/// A user strategy declared as rule chains.
///
/// Omitting `atr_multiplier` disables the trailing stop. The secondary stop
/// and take-profit default to the built-in levels; `0.0` disables either.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CustomStrategyConfig {
    pub name: String,
    pub buy_rules: Vec<Rule>,
    pub sell_rules: Vec<Rule>,
    #[serde(default)]
    pub atr_multiplier: Option<f64>,
    #[serde(default = "default_atr_column")]
    pub atr_column: String,
    #[serde(default = "default_secondary_stop")]
    pub secondary_stop_pct: Option<f64>,
    #[serde(default = "default_take_profit")]
    pub take_profit_pct: Option<f64>,
}

impl CustomStrategyConfig {
    pub fn to_spec(&self) -> StrategySpec {
        let nonzero = |v: Option<f64>| v.filter(|p| *p != 0.0);
        let stops = StopPolicy {
            atr: self.atr_multiplier.map(|multiplier| AtrStop {
                multiplier,
                column: self.atr_column.clone(),
            }),
            secondary_stop_pct: nonzero(self.secondary_stop_pct),
            take_profit_pct: nonzero(self.take_profit_pct),
        };
        StrategySpec::from_rules(&self.name, &self.buy_rules, &self.sell_rules, stops)
    }
}

/// Complete configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub data: DataConfig,
    pub commission: CommissionModel,
    pub run: RunSection,
    #[serde(rename = "custom_strategy")]
    pub custom_strategies: Vec<CustomStrategyConfig>,
}

/// A validated configuration with its strategy list and fingerprint.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: RunnerConfig,
    pub strategies: Vec<StrategySpec>,
    pub fingerprint: ConfigFingerprint,
}

impl RunnerConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate everything and select the strategies to run.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        check_rate("entry_rate", self.commission.entry_rate)?;
        check_rate("exit_rate", self.commission.exit_rate)?;
        if self.data.lookback_days == Some(0) {
            return Err(ConfigError::InvalidLookback);
        }

        let strategies = self.select_strategies()?;
        for spec in &strategies {
            spec.validate().map_err(|source| ConfigError::InvalidStrategy {
                name: spec.name.clone(),
                source,
            })?;
        }
        let fingerprint = fingerprint(&self, &strategies)?;

        Ok(ResolvedConfig {
            config: self,
            strategies,
            fingerprint,
        })
    }

    fn select_strategies(&self) -> Result<Vec<StrategySpec>, ConfigError> {
        let mut available = builtin_strategies();
        let mut names: HashSet<String> = available.iter().map(|s| s.name.clone()).collect();
        let mut slugs: HashMap<String, String> = available
            .iter()
            .map(|s| (strategy_slug(&s.name), s.name.clone()))
            .collect();
        for custom in &self.custom_strategies {
            if !names.insert(custom.name.clone()) {
                return Err(ConfigError::DuplicateStrategy(custom.name.clone()));
            }
            let slug = strategy_slug(&custom.name);
            if slug.is_empty() {
                return Err(ConfigError::UnnamedOutput(custom.name.clone()));
            }
            if let Some(other) = slugs.insert(slug, custom.name.clone()) {
                return Err(ConfigError::OutputNameCollision {
                    name: custom.name.clone(),
                    other,
                });
            }
            available.push(custom.to_spec());
        }

        if self.run.strategies.is_empty() {
            return Ok(available);
        }

        let mut selected = Vec::with_capacity(self.run.strategies.len());
        let mut seen = HashSet::new();
        for name in &self.run.strategies {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateStrategy(name.clone()));
            }
            let spec = available
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| ConfigError::UnknownStrategy(name.clone()))?;
            selected.push(spec.clone());
        }
        Ok(selected)
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidCommission { field, value })
    }
}

/// BLAKE3 over the canonical JSON of the config and the resolved strategy
/// specs. Two runs with the same fingerprint used the same rules.
fn fingerprint(
    config: &RunnerConfig,
    strategies: &[StrategySpec],
) -> Result<ConfigFingerprint, ConfigError> {
    let json = serde_json::to_string(&(config, strategies))?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}
