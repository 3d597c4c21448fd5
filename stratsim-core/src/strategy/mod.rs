//! Strategy specifications — named entry/exit predicates plus a stop policy.
//!
//! Every strategy variant is the same state machine parameterized by data:
//! two predicates and the stop levels. Built-ins live in [`registry`]; user
//! strategies arrive as rule chains from configuration.

pub mod alt_state;
pub mod predicate;
pub mod registry;

pub use alt_state::AltState;
pub use predicate::{fold_rules, CmpOp, Expr, Link, Predicate, Rule, UnknownOperator};
pub use registry::{builtin_strategies, builtin_names, find_builtin};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default column holding the average true range.
pub const DEFAULT_ATR_COLUMN: &str = "ATR";
pub const DEFAULT_SECONDARY_STOP_PCT: f64 = 0.05;
pub const DEFAULT_TAKE_PROFIT_PCT: f64 = 0.15;

/// ATR-based trailing stop: `close - multiplier * ATR`, ratcheted upward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrStop {
    pub multiplier: f64,
    #[serde(default = "default_atr_column")]
    pub column: String,
}

fn default_atr_column() -> String {
    DEFAULT_ATR_COLUMN.to_string()
}

impl AtrStop {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            column: default_atr_column(),
        }
    }
}

/// Stop-loss and take-profit levels applied while a position is open.
///
/// Percentages are fractions: `0.05` places the secondary stop at 95% of the
/// entry price, `0.15` the take-profit at 115%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPolicy {
    pub atr: Option<AtrStop>,
    pub secondary_stop_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::with_atr(1.0)
    }
}

impl StopPolicy {
    /// ATR trailing stop with the default secondary stop and take-profit.
    pub fn with_atr(multiplier: f64) -> Self {
        Self {
            atr: Some(AtrStop::new(multiplier)),
            secondary_stop_pct: Some(DEFAULT_SECONDARY_STOP_PCT),
            take_profit_pct: Some(DEFAULT_TAKE_PROFIT_PCT),
        }
    }

    /// No trailing stop; fixed secondary stop and take-profit only.
    pub fn fixed(secondary_stop_pct: f64, take_profit_pct: f64) -> Self {
        Self {
            atr: None,
            secondary_stop_pct: Some(secondary_stop_pct),
            take_profit_pct: Some(take_profit_pct),
        }
    }

    pub fn secondary_stop(&self, entry_price: f64) -> Option<f64> {
        self.secondary_stop_pct.map(|pct| entry_price * (1.0 - pct))
    }

    pub fn take_profit(&self, entry_price: f64) -> Option<f64> {
        self.take_profit_pct.map(|pct| entry_price * (1.0 + pct))
    }
}

/// Reasons a strategy spec cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    #[error("strategy name is empty")]
    EmptyName,
    #[error("ATR multiplier must be positive and finite, got {0}")]
    InvalidAtrMultiplier(f64),
    #[error("ATR column name is empty")]
    EmptyAtrColumn,
    #[error("{field} must be in [0, 1), got {value}")]
    InvalidPercent { field: &'static str, value: f64 },
}

/// A named, parameterized trading rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    pub entry: Predicate,
    pub exit: Predicate,
    pub stops: StopPolicy,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>, entry: Predicate, exit: Predicate, stops: StopPolicy) -> Self {
        Self {
            name: name.into(),
            entry,
            exit,
            stops,
        }
    }

    /// Build a spec from user rule chains.
    pub fn from_rules(
        name: impl Into<String>,
        buy_rules: &[Rule],
        sell_rules: &[Rule],
        stops: StopPolicy,
    ) -> Self {
        Self::new(name, fold_rules(buy_rules), fold_rules(sell_rules), stops)
    }

    /// Columns the series must carry for this strategy to run, sorted.
    pub fn required_columns(&self) -> Vec<String> {
        let mut cols: BTreeSet<String> = self.entry.columns();
        cols.extend(self.exit.columns());
        if let Some(atr) = &self.stops.atr {
            cols.insert(atr.column.clone());
        }
        cols.into_iter().collect()
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }
        if let Some(atr) = &self.stops.atr {
            if !(atr.multiplier.is_finite() && atr.multiplier > 0.0) {
                return Err(SpecError::InvalidAtrMultiplier(atr.multiplier));
            }
            if atr.column.trim().is_empty() {
                return Err(SpecError::EmptyAtrColumn);
            }
        }
        check_pct("secondary_stop_pct", self.stops.secondary_stop_pct)?;
        check_pct("take_profit_pct", self.stops.take_profit_pct)?;
        Ok(())
    }
}

fn check_pct(field: &'static str, value: Option<f64>) -> Result<(), SpecError> {
    match value {
        Some(v) if !(v.is_finite() && (0.0..1.0).contains(&v)) => {
            Err(SpecError::InvalidPercent { field, value: v })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsi_spec() -> StrategySpec {
        StrategySpec::new(
            "RSI Strategy",
            Predicate::threshold("RSI_14", CmpOp::Lt, 35.0),
            Predicate::threshold("RSI_14", CmpOp::Gt, 65.0),
            StopPolicy::default(),
        )
    }

    #[test]
    fn required_columns_include_atr() {
        assert_eq!(rsi_spec().required_columns(), vec!["ATR", "RSI_14"]);
    }

    #[test]
    fn required_columns_without_atr_stop() {
        let mut spec = rsi_spec();
        spec.stops = StopPolicy::fixed(0.05, 0.10);
        assert_eq!(spec.required_columns(), vec!["RSI_14"]);
    }

    #[test]
    fn default_levels() {
        let stops = StopPolicy::default();
        assert!((stops.secondary_stop(100.0).unwrap() - 95.0).abs() < 1e-10);
        assert!((stops.take_profit(100.0).unwrap() - 115.0).abs() < 1e-10);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let mut spec = rsi_spec();
        assert!(spec.validate().is_ok());

        spec.stops.atr = Some(AtrStop::new(0.0));
        assert_eq!(spec.validate(), Err(SpecError::InvalidAtrMultiplier(0.0)));

        spec.stops.atr = None;
        spec.stops.take_profit_pct = Some(1.5);
        assert!(matches!(
            spec.validate(),
            Err(SpecError::InvalidPercent { field: "take_profit_pct", .. })
        ));

        spec.stops.take_profit_pct = None;
        spec.name = "  ".into();
        assert_eq!(spec.validate(), Err(SpecError::EmptyName));
    }
}
