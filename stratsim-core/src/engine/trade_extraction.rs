//! Trade extraction — pairs Buy/Sell actions into trade records.
//!
//! Pure function: bars + actions → trades. A Buy while holding and a Sell
//! while flat are ignored. A position still open after the last bar becomes
//! one `Open` trade marked at the last tradable close.

use crate::domain::{Action, Bar, CommissionModel, Trade};
use chrono::NaiveDate;
use tracing::{info, warn};

/// Extract trades for one (ticker, strategy) pair.
///
/// `bars` and `actions` are expected to be aligned index by index. When their
/// lengths differ only the common prefix is scanned.
pub fn extract_trades(
    bars: &[Bar],
    actions: &[Action],
    ticker: &str,
    strategy: &str,
    commission: &CommissionModel,
) -> Vec<Trade> {
    if bars.len() != actions.len() {
        warn!(
            ticker,
            strategy,
            bars = bars.len(),
            actions = actions.len(),
            "bar/action length mismatch, scanning common prefix"
        );
    }
    let len = bars.len().min(actions.len());

    let mut trades = Vec::new();
    let mut holding: Option<(NaiveDate, f64)> = None;

    for (bar, action) in bars[..len].iter().zip(&actions[..len]) {
        match (action, holding) {
            (Action::Buy, None) => holding = Some((bar.date, bar.close)),
            (Action::Sell, Some((buy_date, buy_price))) => {
                trades.push(Trade::new(
                    ticker,
                    strategy,
                    buy_date,
                    buy_price,
                    Some(bar.date),
                    bar.close,
                    commission,
                ));
                holding = None;
            }
            _ => {}
        }
    }

    // Trailing NaN closes carry no price; skip back to the last usable one.
    let mark = bars[..len]
        .iter()
        .rev()
        .find(|b| b.has_tradable_close())
        .or_else(|| bars[..len].last());
    if let (Some((buy_date, buy_price)), Some(mark)) = (holding, mark) {
        info!(
            ticker,
            strategy,
            %buy_date,
            buy_price,
            mark_date = %mark.date,
            mark_close = mark.close,
            "position unresolved at end of series, marking at last close"
        );
        trades.push(Trade::new(
            ticker, strategy, buy_date, buy_price, None, mark.close, commission,
        ));
    }

    trades
}
