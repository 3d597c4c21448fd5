//! Simulation aggregator — compounds each iteration and summarizes a strategy.
//!
//! The Simulation Result is the mean compounded return across iterations:
//! the average growth of one unit of capital when the strategy's trades are
//! spread over as many parallel allocations as the partition needs.

use super::partition::{partition_with_scope, trade_order, Iteration, Partition, PartitionScope};
use crate::domain::Trade;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub number: usize,
    pub trade_count: usize,
    pub compounded_return: f64,
}

impl From<&Iteration> for IterationStats {
    fn from(it: &Iteration) -> Self {
        Self {
            number: it.number,
            trade_count: it.len(),
            compounded_return: it.compounded_return(),
        }
    }
}

/// Aggregate statistics for one strategy across every ticker it traded.
///
/// Trade statistics use commission-adjusted values and cover accepted trades
/// only; rejected trades are counted separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRunSummary {
    pub strategy: String,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with positive commission-adjusted profit.
    pub win_rate: f64,
    pub average_profit: f64,
    pub average_profit_percent: f64,
    pub average_gain_factor: f64,
    pub product_of_gain_factors: f64,
    pub simulation_result: f64,
    pub iteration_count: usize,
    pub iterations: Vec<IterationStats>,
    pub rejected_trades: usize,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Summarize a partition.
pub fn summarize(strategy: &str, partition: &Partition) -> StrategyRunSummary {
    let trades: Vec<&Trade> = partition
        .iterations
        .iter()
        .flat_map(|it| it.trades.iter())
        .collect();
    let total = trades.len();
    let open = trades.iter().filter(|t| t.is_open()).count();
    let winning = trades.iter().filter(|t| t.is_winner()).count();
    let losing = trades.iter().filter(|t| t.is_loser()).count();

    let iterations: Vec<IterationStats> = partition.iterations.iter().map(IterationStats::from).collect();

    StrategyRunSummary {
        strategy: strategy.to_string(),
        total_trades: total,
        closed_trades: total - open,
        open_trades: open,
        winning_trades: winning,
        losing_trades: losing,
        win_rate: if total == 0 {
            0.0
        } else {
            winning as f64 / total as f64 * 100.0
        },
        average_profit: mean(trades.iter().map(|t| t.profit_commission)),
        average_profit_percent: mean(trades.iter().map(|t| t.profit_percent_commission)),
        average_gain_factor: mean(trades.iter().map(|t| t.gain_factor_commission)),
        product_of_gain_factors: trades.iter().map(|t| t.gain_factor_commission).product(),
        simulation_result: mean(iterations.iter().map(|s| s.compounded_return)),
        iteration_count: iterations.len(),
        iterations,
        rejected_trades: partition.rejected.len(),
    }
}

/// One assigned trade annotated with its place in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub trade: Trade,
    pub iteration: usize,
    pub simulated: bool,
    /// Compounded return of `iteration` up to and including this trade.
    pub running_return: f64,
}

/// Simulation table rows in canonical trade order.
pub fn simulation_rows(partition: &Partition) -> Vec<SimulationRow> {
    let mut rows: Vec<SimulationRow> = Vec::with_capacity(partition.assigned_count());
    for it in &partition.iterations {
        let mut running = 1.0;
        for trade in &it.trades {
            running *= trade.gain_factor_commission;
            rows.push(SimulationRow {
                trade: trade.clone(),
                iteration: it.number,
                simulated: true,
                running_return: running,
            });
        }
    }
    rows.sort_by(|a, b| trade_order(&a.trade, &b.trade));
    rows
}

/// Partitioned and summarized trades of one strategy.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub strategy: String,
    pub partition: Partition,
    pub summary: StrategyRunSummary,
}

/// Partition a strategy's pooled trades and summarize the result.
pub fn simulate(strategy: &str, trades: Vec<Trade>, scope: PartitionScope) -> Simulation {
    let partition = partition_with_scope(trades, scope);
    let summary = summarize(strategy, &partition);
    info!(
        strategy,
        trades = summary.total_trades,
        iterations = summary.iteration_count,
        rejected = summary.rejected_trades,
        simulation_result = summary.simulation_result,
        "strategy simulated"
    );
    Simulation {
        strategy: strategy.to_string(),
        partition,
        summary,
    }
}
