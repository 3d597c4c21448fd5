//! Signal state machine — turns indicator bars into Buy/Sell/Hold actions.
//!
//! One left-to-right pass per (ticker, strategy). The only carried state is
//! the [`PositionState`] and the previous close used to gate the trailing
//! stop ratchet; nothing looks ahead.
//!
//! Exit priority while in a position:
//! 1. close at or below the effective stop (trailing, floored by secondary)
//! 2. the strategy's exit predicate
//! 3. close at or above the take-profit level

use crate::domain::{Action, Bar, ExitReason, IndicatorSeries, OpenPosition, PositionState};
use crate::strategy::StrategySpec;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("missing indicator columns: {}", columns.join(", "))]
    MissingIndicator { columns: Vec<String> },
    #[error("indicator series has no bars")]
    EmptySeries,
}

/// Outcome of one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalStep {
    pub action: Action,
    pub exit_reason: Option<ExitReason>,
}

impl SignalStep {
    fn hold() -> Self {
        Self {
            action: Action::Hold,
            exit_reason: None,
        }
    }

    fn buy() -> Self {
        Self {
            action: Action::Buy,
            exit_reason: None,
        }
    }

    fn sell(reason: ExitReason) -> Self {
        Self {
            action: Action::Sell,
            exit_reason: Some(reason),
        }
    }
}

/// Bar-by-bar state machine for a single strategy.
#[derive(Debug, Clone)]
pub struct SignalMachine<'a> {
    spec: &'a StrategySpec,
    state: PositionState,
    prev_close: Option<f64>,
}

impl<'a> SignalMachine<'a> {
    pub fn new(spec: &'a StrategySpec) -> Self {
        Self {
            spec,
            state: PositionState::Flat,
            prev_close: None,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    /// Advance by one bar.
    ///
    /// A bar without a usable close is skipped entirely: Hold, and neither
    /// the position nor the previous-close reference changes.
    pub fn step(&mut self, bar: &Bar) -> SignalStep {
        if !bar.has_tradable_close() {
            return SignalStep::hold();
        }
        let close = bar.close;
        let rising = self.prev_close.is_some_and(|prev| close > prev);

        let (next, step) = match self.state {
            PositionState::Flat => {
                if self.spec.entry.eval(bar) {
                    let pos = self.open(bar);
                    debug!(
                        strategy = %self.spec.name,
                        date = %bar.date,
                        entry = close,
                        stop = ?pos.effective_stop(),
                        take_profit = ?pos.take_profit,
                        "entry"
                    );
                    (PositionState::Open(pos), SignalStep::buy())
                } else {
                    (PositionState::Flat, SignalStep::hold())
                }
            }
            PositionState::Open(pos) => {
                let pos = if rising { self.ratchet(pos, bar) } else { pos };
                match self.exit_reason(&pos, bar) {
                    Some(reason) => {
                        debug!(
                            strategy = %self.spec.name,
                            date = %bar.date,
                            exit = close,
                            entry = pos.entry_price,
                            ?reason,
                            "exit"
                        );
                        (PositionState::Flat, SignalStep::sell(reason))
                    }
                    None => (PositionState::Open(pos), SignalStep::hold()),
                }
            }
        };

        self.state = next;
        self.prev_close = Some(close);
        step
    }

    fn atr(&self, bar: &Bar) -> Option<(f64, f64)> {
        let stop = self.spec.stops.atr.as_ref()?;
        let atr = bar.value(&stop.column)?;
        atr.is_finite().then_some((atr, stop.multiplier))
    }

    fn open(&self, bar: &Bar) -> OpenPosition {
        let entry = bar.close;
        OpenPosition {
            entry_price: entry,
            entry_date: bar.date,
            trailing_stop: self.atr(bar).map(|(atr, m)| entry - m * atr),
            secondary_stop: self.spec.stops.secondary_stop(entry),
            take_profit: self.spec.stops.take_profit(entry),
        }
    }

    fn ratchet(&self, pos: OpenPosition, bar: &Bar) -> OpenPosition {
        match self.atr(bar) {
            Some((atr, m)) => pos.ratchet(bar.close - m * atr),
            None => pos,
        }
    }

    fn exit_reason(&self, pos: &OpenPosition, bar: &Bar) -> Option<ExitReason> {
        let close = bar.close;
        if pos.effective_stop().is_some_and(|stop| close <= stop) {
            Some(ExitReason::StopLoss)
        } else if self.spec.exit.eval(bar) {
            Some(ExitReason::Signal)
        } else if pos.take_profit.is_some_and(|tp| close >= tp) {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

/// Actions for one (ticker, strategy) pair, aligned with the input bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSeries {
    pub ticker: String,
    pub strategy: String,
    pub dates: Vec<NaiveDate>,
    pub actions: Vec<Action>,
    pub exit_reasons: Vec<Option<ExitReason>>,
    pub final_state: PositionState,
}

impl ActionSeries {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.actions.iter().filter(|a| **a == action).count()
    }

    pub fn last_action(&self) -> Option<Action> {
        self.actions.last().copied()
    }
}

/// Run a strategy over a full series.
///
/// Fails before touching any bar if the series lacks a required column, so a
/// misconfigured pair produces no partial output.
pub fn generate_actions(
    series: &IndicatorSeries,
    spec: &StrategySpec,
) -> Result<ActionSeries, SignalError> {
    let required = spec.required_columns();
    let missing = series.missing_columns(required.iter().map(String::as_str));
    if !missing.is_empty() {
        return Err(SignalError::MissingIndicator { columns: missing });
    }
    if series.is_empty() {
        return Err(SignalError::EmptySeries);
    }

    let mut machine = SignalMachine::new(spec);
    let n = series.len();
    let mut dates = Vec::with_capacity(n);
    let mut actions = Vec::with_capacity(n);
    let mut exit_reasons = Vec::with_capacity(n);

    for bar in &series.bars {
        let step = machine.step(bar);
        dates.push(bar.date);
        actions.push(step.action);
        exit_reasons.push(step.exit_reason);
    }

    Ok(ActionSeries {
        ticker: series.ticker.clone(),
        strategy: spec.name.clone(),
        dates,
        actions,
        exit_reasons,
        final_state: machine.state(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{CmpOp, Predicate, StopPolicy};

    fn date(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn make_bars(closes: &[f64], rsi: &[f64], atr: f64) -> Vec<Bar> {
        closes
            .iter()
            .zip(rsi)
            .enumerate()
            .map(|(i, (&c, &r))| {
                Bar::new(date(i), c, c, c, c)
                    .with_indicator("RSI_14", r)
                    .with_indicator("ATR", atr)
            })
            .collect()
    }

    fn rsi_spec(stops: StopPolicy) -> StrategySpec {
        StrategySpec::new(
            "RSI Strategy",
            Predicate::threshold("RSI_14", CmpOp::Lt, 35.0),
            Predicate::threshold("RSI_14", CmpOp::Gt, 65.0),
            stops,
        )
    }

    fn run(bars: Vec<Bar>, spec: &StrategySpec) -> ActionSeries {
        generate_actions(&IndicatorSeries::from_bars("TEST", bars), spec).unwrap()
    }

    use Action::{Buy, Hold, Sell};

    #[test]
    fn rsi_round_trip() {
        let bars = make_bars(
            &[100.0, 98.0, 96.0, 110.0, 108.0],
            &[40.0, 30.0, 28.0, 70.0, 72.0],
            3.0,
        );
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Hold, Buy, Hold, Sell, Hold]);
        assert_eq!(out.exit_reasons[3], Some(ExitReason::Signal));
        assert_eq!(out.final_state, PositionState::Flat);
    }

    #[test]
    fn trailing_stop_fires_before_exit_predicate() {
        // Entry 100, ATR 2 → trail 98. Close 104 ratchets to 102, then 101 stops out
        // even though RSI also says exit.
        let bars = make_bars(&[100.0, 104.0, 101.0], &[30.0, 50.0, 70.0], 2.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Buy, Hold, Sell]);
        assert_eq!(out.exit_reasons[2], Some(ExitReason::StopLoss));
    }

    #[test]
    fn trailing_stop_only_ratchets_on_rising_close() {
        // Entry 100 trail 98. Close 99 (falling) must not move the stop; close 98.5 holds.
        let bars = make_bars(&[100.0, 99.0, 98.5], &[30.0, 50.0, 50.0], 2.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Buy, Hold, Hold]);
        let pos = out.final_state.open_position().copied().unwrap();
        assert_eq!(pos.trailing_stop, Some(98.0));
    }

    #[test]
    fn secondary_stop_floors_a_wide_trailing_stop() {
        // ATR 20 puts the trail at 80; the 5% floor at 95 fires first.
        let bars = make_bars(&[100.0, 95.0], &[30.0, 50.0], 20.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Buy, Sell]);
        assert_eq!(out.exit_reasons[1], Some(ExitReason::StopLoss));
    }

    #[test]
    fn take_profit_inclusive() {
        // ATR 100 keeps the trail far below; 115 hits the 15% target exactly.
        let bars = make_bars(&[100.0, 115.0], &[30.0, 50.0], 100.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Buy, Sell]);
        assert_eq!(out.exit_reasons[1], Some(ExitReason::TakeProfit));
    }

    #[test]
    fn entry_not_reevaluated_while_holding() {
        let bars = make_bars(&[100.0, 100.5, 100.2], &[30.0, 20.0, 25.0], 1.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.count(Buy), 1);
    }

    #[test]
    fn nan_close_is_skipped() {
        let mut bars = make_bars(&[100.0, 100.0, 101.0], &[50.0, 30.0, 50.0], 1.0);
        bars[1].close = f64::NAN;
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Hold, Hold, Hold]);
        assert_eq!(out.final_state, PositionState::Flat);
    }

    #[test]
    fn nan_close_keeps_previous_close_reference() {
        // Entry 100 trail 98. Bar 2 is NaN; bar 3 closes 99 < 100, so no ratchet.
        let mut bars = make_bars(&[100.0, 0.0, 99.0], &[30.0, 50.0, 50.0], 2.0);
        bars[1].close = f64::NAN;
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        let pos = out.final_state.open_position().copied().unwrap();
        assert_eq!(pos.trailing_stop, Some(98.0));
    }

    #[test]
    fn nan_indicator_never_enters() {
        let bars = make_bars(&[100.0, 101.0], &[f64::NAN, f64::NAN], 1.0);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.actions, vec![Hold, Hold]);
    }

    #[test]
    fn nan_atr_on_entry_leaves_trailing_unset() {
        let bars = make_bars(&[100.0, 101.0], &[30.0, 50.0], f64::NAN);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        let pos = out.final_state.open_position().copied().unwrap();
        assert_eq!(pos.trailing_stop, None);
        assert_eq!(pos.effective_stop(), Some(95.0));
    }

    #[test]
    fn missing_column_is_reported() {
        let spec = StrategySpec::new(
            "RSICMF Strategy",
            Predicate::threshold("CMF_20", CmpOp::Gt, 0.0),
            Predicate::Never,
            StopPolicy::default(),
        );
        let series = IndicatorSeries::from_bars("TEST", make_bars(&[1.0], &[50.0], 1.0));
        let err = generate_actions(&series, &spec).unwrap_err();
        assert_eq!(
            err,
            SignalError::MissingIndicator {
                columns: vec!["CMF_20".into()]
            }
        );
    }

    #[test]
    fn empty_series_is_an_error() {
        let series = IndicatorSeries::new(
            "TEST",
            ["Close", "RSI_14", "ATR"].iter().map(|s| s.to_string()).collect(),
            vec![],
        );
        let err = generate_actions(&series, &rsi_spec(StopPolicy::default())).unwrap_err();
        assert_eq!(err, SignalError::EmptySeries);
    }

    #[test]
    fn one_action_per_bar() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0], &[30.0, 70.0, 30.0, 50.0], 0.1);
        let out = run(bars, &rsi_spec(StopPolicy::default()));
        assert_eq!(out.len(), 4);
        assert_eq!(out.dates.len(), 4);
        assert_eq!(out.exit_reasons.len(), 4);
    }
}
