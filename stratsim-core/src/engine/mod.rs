//! Backtest pipeline — the four stages between indicator bars and a summary.
//!
//! 1. [`signal`]: bars → Buy/Sell/Hold per strategy
//! 2. [`trade_extraction`]: actions → trades, commission applied
//! 3. [`partition`]: trades → non-overlapping iterations
//! 4. [`simulation`]: iterations → compounded returns and summary
//!
//! Each stage is a pure function of its inputs.

pub mod partition;
pub mod signal;
pub mod simulation;
pub mod trade_extraction;

pub use partition::{
    partition_trades, partition_with_scope, trade_order, validate_trades, Iteration, Partition,
    PartitionInputError, PartitionScope, RejectedTrade,
};
pub use signal::{generate_actions, ActionSeries, SignalError, SignalMachine, SignalStep};
pub use simulation::{
    simulate, simulation_rows, summarize, IterationStats, Simulation, SimulationRow,
    StrategyRunSummary,
};
pub use trade_extraction::extract_trades;
