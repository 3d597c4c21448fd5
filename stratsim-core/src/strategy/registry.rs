//! Built-in strategy registry.
//!
//! Names are part of the output schema: they become column headers in the
//! action tables and row keys in the summary.

use super::predicate::{CmpOp, Expr, Predicate};
use super::{StopPolicy, StrategySpec};

const RSI: &str = "RSI_14";
const OBV_ROC: &str = "OBV_RoC";
const OBV_SMA_DIFF: &str = "OBV_SMA_Diff";
const CMF: &str = "CMF_20";
const MACD: &str = "MACD_12_26_9";
const MACD_SIGNAL: &str = "MACDs_12_26_9";
const MACD_HIST: &str = "MACDh_12_26_9";
const EMA5: &str = "EMA5";

fn lt(col: &str, v: f64) -> Predicate {
    Predicate::threshold(col, CmpOp::Lt, v)
}

fn gt(col: &str, v: f64) -> Predicate {
    Predicate::threshold(col, CmpOp::Gt, v)
}

fn cols(left: &str, op: CmpOp, right: &str) -> Predicate {
    Predicate::compare(Expr::col(left), op, Expr::col(right))
}

/// RSI confirmed by a second indicator: oversold + `confirm > 0` in,
/// overbought + `confirm < 0` out.
fn rsi_with(name: &str, confirm: &str) -> StrategySpec {
    StrategySpec::new(
        name,
        Predicate::all(vec![lt(RSI, 35.0), gt(confirm, 0.0)]),
        Predicate::all(vec![gt(RSI, 65.0), lt(confirm, 0.0)]),
        StopPolicy::default(),
    )
}

fn sign_flip(name: &str, col: &str) -> StrategySpec {
    StrategySpec::new(name, gt(col, 0.0), lt(col, 0.0), StopPolicy::default())
}

fn psar(name: &str, psar_col: &str) -> StrategySpec {
    StrategySpec::new(
        name,
        cols(psar_col, CmpOp::Lt, EMA5),
        cols(psar_col, CmpOp::Gt, EMA5),
        StopPolicy::default(),
    )
}

/// Mean-reversion entry below `mean - 2 * std`; exits only on stops.
fn rolling_band(name: &str, mean_col: &str, std_col: &str) -> StrategySpec {
    let lower_band = Expr::col(mean_col).sub(Expr::constant(2.0).mul(Expr::col(std_col)));
    StrategySpec::new(
        name,
        Predicate::compare(Expr::col("Close"), CmpOp::Lt, lower_band),
        Predicate::Never,
        StopPolicy::fixed(0.05, 0.10),
    )
}

/// Every built-in strategy, in registry order.
pub fn builtin_strategies() -> Vec<StrategySpec> {
    vec![
        StrategySpec::new("RSI Strategy", lt(RSI, 35.0), gt(RSI, 65.0), StopPolicy::with_atr(1.0)),
        StrategySpec::new("RSI Strategy2", lt(RSI, 40.0), gt(RSI, 60.0), StopPolicy::with_atr(2.0)),
        rsi_with("RSI14_OBV_RoC Strategy", OBV_ROC),
        StrategySpec::new(
            "RSIMACD Strategy",
            Predicate::all(vec![
                lt(RSI, 35.0),
                gt(MACD_HIST, 0.0),
                lt(MACD, 0.0),
                lt(MACD_SIGNAL, 0.0),
            ]),
            Predicate::all(vec![
                gt(RSI, 65.0),
                lt(MACD_HIST, 0.0),
                gt(MACD, 0.0),
                gt(MACD_SIGNAL, 0.0),
            ]),
            StopPolicy::default(),
        ),
        rsi_with("RSICMF Strategy", CMF),
        rsi_with("RSI OBV Strategy", OBV_SMA_DIFF),
        sign_flip("OBV Strategy", OBV_SMA_DIFF),
        StrategySpec::new(
            "MACD Strategy",
            Predicate::all(vec![lt(MACD, 0.0), lt(MACD_SIGNAL, 0.0), gt(MACD_HIST, 0.0)]),
            Predicate::all(vec![gt(MACD, 0.0), gt(MACD_SIGNAL, 0.0), lt(MACD_HIST, 0.0)]),
            StopPolicy::default(),
        ),
        sign_flip("CMF Strategy", CMF),
        psar("EMA5 PSAR Strategy", "PSARl_0.02_0.2"),
        psar("EMA5 PSAR Strategy2", "PSARl_0.01_0.1"),
        StrategySpec::new(
            "SMA Crossover Strategy",
            cols("SMA10", CmpOp::Gt, "SMA50"),
            cols("SMA10", CmpOp::Lt, "SMA50"),
            StopPolicy::default(),
        ),
        rolling_band("Rolling Std10 Strategy", "SMA10", "Rolling_Std_10"),
        rolling_band("Rolling Std50 Strategy", "SMA50", "Rolling_Std_50"),
    ]
}

pub fn builtin_names() -> Vec<String> {
    builtin_strategies().into_iter().map(|s| s.name).collect()
}

/// Look up a built-in by exact name.
pub fn find_builtin(name: &str) -> Option<StrategySpec> {
    builtin_strategies().into_iter().find(|s| s.name == name)
}
