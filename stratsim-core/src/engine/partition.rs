//! Iteration partitioner — splits overlapping trades into non-overlapping tracks.
//!
//! Each iteration models one unit of capital: it can only hold one trade at
//! a time, so a trade joins a chain only if it opens strictly after the
//! chain's last trade closed. The number of iterations is the number of
//! concurrent allocations needed to take every trade.
//!
//! Chains are built greedily over trades sorted by
//! (buy_date, sell_date, ticker, strategy), always taking the earliest
//! unassigned trade that fits. An open trade ends its chain.

use crate::domain::{Trade, TradeKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PartitionInputError {
    #[error("{ticker}/{strategy}: sell date {sell_date} precedes buy date {buy_date}")]
    InvertedDates {
        ticker: String,
        strategy: String,
        buy_date: NaiveDate,
        sell_date: NaiveDate,
    },
    #[error("{ticker}/{strategy}: duplicate trade opened on {buy_date}")]
    DuplicateTrade {
        ticker: String,
        strategy: String,
        buy_date: NaiveDate,
    },
    #[error("{ticker}/{strategy}: invalid gain factor {gain_factor} on trade opened {buy_date}")]
    InvalidGainFactor {
        ticker: String,
        strategy: String,
        buy_date: NaiveDate,
        gain_factor: f64,
    },
}

/// A trade excluded from partitioning, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedTrade {
    pub trade: Trade,
    pub error: PartitionInputError,
}

/// Whether trades of different tickers compete for the same iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionScope {
    /// One partition across every ticker.
    #[default]
    Merged,
    /// Partition each ticker on its own, then concatenate.
    PerTicker,
}

/// One non-overlapping chain of trades. Numbers start at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub number: usize,
    pub trades: Vec<Trade>,
}

impl Iteration {
    /// Product of commission-adjusted gain factors in chain order.
    pub fn compounded_return(&self) -> f64 {
        self.trades.iter().map(|t| t.gain_factor_commission).product()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub iterations: Vec<Iteration>,
    pub rejected: Vec<RejectedTrade>,
}

impl Partition {
    /// Number of trades assigned to some iteration.
    pub fn assigned_count(&self) -> usize {
        self.iterations.iter().map(Iteration::len).sum()
    }
}

/// Canonical trade order: buy date, then sell date (open last), then ticker,
/// then strategy.
pub fn trade_order(a: &Trade, b: &Trade) -> Ordering {
    a.buy_date
        .cmp(&b.buy_date)
        .then_with(|| a.effective_sell_date().cmp(&b.effective_sell_date()))
        .then_with(|| a.ticker.cmp(&b.ticker))
        .then_with(|| a.strategy.cmp(&b.strategy))
}

fn check(trade: &Trade, seen: &HashSet<TradeKey>) -> Result<(), PartitionInputError> {
    if let Some(sell_date) = trade.sell_date {
        if sell_date < trade.buy_date {
            return Err(PartitionInputError::InvertedDates {
                ticker: trade.ticker.clone(),
                strategy: trade.strategy.clone(),
                buy_date: trade.buy_date,
                sell_date,
            });
        }
    }
    let gf = trade.gain_factor_commission;
    if !(gf.is_finite() && gf > 0.0) {
        return Err(PartitionInputError::InvalidGainFactor {
            ticker: trade.ticker.clone(),
            strategy: trade.strategy.clone(),
            buy_date: trade.buy_date,
            gain_factor: gf,
        });
    }
    if seen.contains(&trade.key()) {
        return Err(PartitionInputError::DuplicateTrade {
            ticker: trade.ticker.clone(),
            strategy: trade.strategy.clone(),
            buy_date: trade.buy_date,
        });
    }
    Ok(())
}

/// `trade_order` with prices as the last tie-break, so identical keys still
/// sort the same way regardless of input order.
fn validation_order(a: &Trade, b: &Trade) -> Ordering {
    trade_order(a, b)
        .then_with(|| a.buy_price.total_cmp(&b.buy_price))
        .then_with(|| a.sell_price.total_cmp(&b.sell_price))
}

/// Split trades into accepted and rejected, one trade at a time.
///
/// Trades are checked in canonical order, so of several trades sharing an
/// identity the one that sorts first is kept whatever the input order.
pub fn validate_trades(mut trades: Vec<Trade>) -> (Vec<Trade>, Vec<RejectedTrade>) {
    trades.sort_by(validation_order);
    let mut seen = HashSet::with_capacity(trades.len());
    let mut accepted = Vec::with_capacity(trades.len());
    let mut rejected = Vec::new();

    for trade in trades {
        match check(&trade, &seen) {
            Ok(()) => {
                seen.insert(trade.key());
                accepted.push(trade);
            }
            Err(error) => {
                warn!(%error, "rejecting trade");
                rejected.push(RejectedTrade { trade, error });
            }
        }
    }
    (accepted, rejected)
}

/// Greedy chaining over already-validated trades. Iterations are numbered
/// from `first_number`.
fn chain(mut trades: Vec<Trade>, first_number: usize) -> Vec<Iteration> {
    trades.sort_by(trade_order);

    // Unassigned trade indices in sort order.
    let mut pending: BTreeSet<usize> = (0..trades.len()).collect();
    let mut chains: Vec<Vec<usize>> = Vec::new();

    while let Some(head) = pending.pop_first() {
        let mut members = vec![head];
        let mut tail = head;

        while let Some(sell_date) = trades[tail].sell_date {
            // Trades are sorted by buy date, so every candidate sits at or
            // after the first index whose buy date is past the tail's exit.
            let start = trades.partition_point(|t| t.buy_date <= sell_date);
            let Some(&next) = pending.range(start..).next() else {
                break;
            };
            pending.remove(&next);
            members.push(next);
            tail = next;
        }
        chains.push(members);
    }

    let mut slots: Vec<Option<Trade>> = trades.into_iter().map(Some).collect();
    chains
        .into_iter()
        .enumerate()
        .map(|(i, members)| {
            let trades: Vec<Trade> = members.into_iter().filter_map(|idx| slots[idx].take()).collect();
            let number = first_number + i;
            debug!(iteration = number, trades = trades.len(), "iteration closed");
            Iteration { number, trades }
        })
        .collect()
}

/// Validate and partition a set of trades into a single merged pool.
pub fn partition_trades(trades: Vec<Trade>) -> Partition {
    partition_with_scope(trades, PartitionScope::Merged)
}

/// Validate and partition with an explicit scope.
pub fn partition_with_scope(trades: Vec<Trade>, scope: PartitionScope) -> Partition {
    let (accepted, rejected) = validate_trades(trades);

    let iterations = match scope {
        PartitionScope::Merged => chain(accepted, 1),
        PartitionScope::PerTicker => {
            let mut by_ticker: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
            for trade in accepted {
                by_ticker.entry(trade.ticker.clone()).or_default().push(trade);
            }
            let mut iterations = Vec::new();
            for (_, group) in by_ticker {
                let next = iterations.len() + 1;
                iterations.extend(chain(group, next));
            }
            iterations
        }
    };

    Partition {
        iterations,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommissionModel;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn trade(ticker: &str, buy: NaiveDate, sell: Option<NaiveDate>, gf: f64) -> Trade {
        Trade::new(
            ticker,
            "RSI Strategy",
            buy,
            100.0,
            sell,
            100.0 * gf,
            &CommissionModel::zero(),
        )
    }

    fn buy_dates(it: &Iteration) -> Vec<NaiveDate> {
        it.trades.iter().map(|t| t.buy_date).collect()
    }

    #[test]
    fn overlapping_trades_split_into_two_iterations() {
        let a = trade("A", d(1, 1), Some(d(1, 10)), 1.1);
        let b = trade("B", d(1, 5), Some(d(1, 20)), 1.0);
        let c = trade("C", d(1, 12), Some(d(1, 25)), 0.9);
        let p = partition_trades(vec![c, b, a]);

        assert_eq!(p.iterations.len(), 2);
        assert_eq!(p.iterations[0].number, 1);
        assert_eq!(buy_dates(&p.iterations[0]), vec![d(1, 1), d(1, 12)]);
        assert_eq!(p.iterations[1].number, 2);
        assert_eq!(buy_dates(&p.iterations[1]), vec![d(1, 5)]);
        assert!(p.rejected.is_empty());
    }

    #[test]
    fn same_day_exit_and_entry_do_not_chain() {
        let a = trade("A", d(1, 1), Some(d(1, 10)), 1.0);
        let b = trade("B", d(1, 10), Some(d(1, 15)), 1.0);
        let p = partition_trades(vec![a, b]);
        assert_eq!(p.iterations.len(), 2);
    }

    #[test]
    fn open_trade_ends_chain() {
        let a = trade("A", d(1, 1), None, 1.0);
        let b = trade("B", d(2, 1), Some(d(2, 5)), 1.0);
        let p = partition_trades(vec![a, b]);
        assert_eq!(p.iterations.len(), 2);
        assert!(p.iterations[0].trades[0].is_open());
    }

    #[test]
    fn open_trade_sorts_after_closed_on_same_buy_date() {
        let open = trade("A", d(1, 1), None, 1.0);
        let closed = trade("B", d(1, 1), Some(d(1, 3)), 1.0);
        let p = partition_trades(vec![open, closed]);
        assert_eq!(p.iterations[0].trades[0].ticker, "B");
    }

    #[test]
    fn chain_takes_earliest_fitting_trade() {
        // After A closes on 01-10 both C (01-11) and D (01-15) fit; C is earliest.
        let a = trade("A", d(1, 1), Some(d(1, 10)), 1.0);
        let c = trade("C", d(1, 11), Some(d(1, 30)), 1.0);
        let dd = trade("D", d(1, 15), Some(d(1, 16)), 1.0);
        let p = partition_trades(vec![dd, c, a]);
        assert_eq!(buy_dates(&p.iterations[0]), vec![d(1, 1), d(1, 11)]);
        assert_eq!(buy_dates(&p.iterations[1]), vec![d(1, 15)]);
    }

    #[test]
    fn inverted_dates_rejected_rest_partitioned() {
        let bad = trade("A", d(1, 10), Some(d(1, 5)), 1.0);
        let good = trade("B", d(1, 1), Some(d(1, 2)), 1.0);
        let p = partition_trades(vec![bad, good]);
        assert_eq!(p.rejected.len(), 1);
        assert!(matches!(
            p.rejected[0].error,
            PartitionInputError::InvertedDates { .. }
        ));
        assert_eq!(p.assigned_count(), 1);
    }

    #[test]
    fn duplicate_identity_rejected() {
        let a = trade("A", d(1, 1), Some(d(1, 2)), 1.0);
        let dup = trade("A", d(1, 1), Some(d(1, 3)), 1.2);
        let p = partition_trades(vec![a, dup]);
        assert_eq!(p.rejected.len(), 1);
        assert!(matches!(
            p.rejected[0].error,
            PartitionInputError::DuplicateTrade { .. }
        ));
        assert_eq!(p.iterations[0].trades[0].sell_date, Some(d(1, 2)));
    }

    #[test]
    fn duplicate_resolution_ignores_input_order() {
        let a = trade("A", d(1, 1), Some(d(1, 2)), 1.5);
        let dup = trade("A", d(1, 1), Some(d(1, 3)), 0.5);

        let forward = partition_trades(vec![a.clone(), dup.clone()]);
        let reversed = partition_trades(vec![dup, a]);
        for p in [&forward, &reversed] {
            assert_eq!(p.rejected.len(), 1);
            assert_eq!(p.rejected[0].trade.sell_date, Some(d(1, 3)));
            assert_eq!(p.iterations[0].trades[0].sell_date, Some(d(1, 2)));
        }
        assert_eq!(
            forward.iterations[0].compounded_return(),
            reversed.iterations[0].compounded_return()
        );
    }

    #[test]
    fn same_dates_duplicate_keeps_lower_price_either_way() {
        let cheap = trade("A", d(1, 1), Some(d(1, 2)), 1.1);
        let mut dear = trade("A", d(1, 1), Some(d(1, 2)), 1.1);
        dear.buy_price = 101.0;

        let forward = partition_trades(vec![cheap.clone(), dear.clone()]);
        let reversed = partition_trades(vec![dear, cheap]);
        assert_eq!(forward.iterations[0].trades[0].buy_price, 100.0);
        assert_eq!(reversed.iterations[0].trades[0].buy_price, 100.0);
    }

    #[test]
    fn non_positive_gain_factor_rejected() {
        let zero = trade("A", d(1, 1), Some(d(1, 2)), 0.0);
        let p = partition_trades(vec![zero]);
        assert!(p.iterations.is_empty());
        assert!(matches!(
            p.rejected[0].error,
            PartitionInputError::InvalidGainFactor { .. }
        ));
    }

    #[test]
    fn per_ticker_scope_partitions_independently() {
        let a1 = trade("A", d(1, 1), Some(d(1, 10)), 1.0);
        let b1 = trade("B", d(1, 5), Some(d(1, 8)), 1.0);
        let a2 = trade("A", d(1, 12), Some(d(1, 20)), 1.0);

        let merged = partition_with_scope(vec![a1.clone(), b1.clone(), a2.clone()], PartitionScope::Merged);
        assert_eq!(merged.iterations.len(), 2);

        let sharded = partition_with_scope(vec![a1, b1, a2], PartitionScope::PerTicker);
        assert_eq!(sharded.iterations.len(), 2);
        assert_eq!(sharded.iterations[0].number, 1);
        assert_eq!(sharded.iterations[0].trades.len(), 2);
        assert_eq!(sharded.iterations[1].number, 2);
        assert_eq!(sharded.iterations[1].trades[0].ticker, "B");
    }

    #[test]
    fn compounded_return_is_product() {
        let it = Iteration {
            number: 1,
            trades: vec![
                trade("A", d(1, 1), Some(d(1, 2)), 1.05),
                trade("A", d(1, 3), Some(d(1, 4)), 0.98),
                trade("A", d(1, 5), Some(d(1, 6)), 1.10),
            ],
        };
        assert!((it.compounded_return() - 1.1319).abs() < 1e-9);
    }

    #[test]
    fn empty_input() {
        let p = partition_trades(vec![]);
        assert!(p.iterations.is_empty());
        assert!(p.rejected.is_empty());
    }
}
