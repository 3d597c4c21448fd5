//! stratsim core — strategy signals, trade reconstruction and iteration simulation.
//!
//! This crate is pure: no file or network I/O. It contains
//! - Domain types (bars, indicator series, actions, positions, trades)
//! - Strategy specifications as data, the built-in registry and user rule chains
//! - The signal state machine with trailing, secondary and take-profit exits
//! - Trade extraction with commission adjustment
//! - The greedy iteration partitioner and simulation aggregator
//! - The alternative monitor/hold state table

pub mod domain;
pub mod engine;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner moves across rayon workers
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::IndicatorSeries>();
        require_sync::<domain::IndicatorSeries>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::PositionState>();
        require_sync::<domain::PositionState>();
        require_send::<domain::CommissionModel>();
        require_sync::<domain::CommissionModel>();

        // Strategy types
        require_send::<strategy::StrategySpec>();
        require_sync::<strategy::StrategySpec>();
        require_send::<strategy::AltState>();
        require_sync::<strategy::AltState>();

        // Engine outputs
        require_send::<engine::ActionSeries>();
        require_sync::<engine::ActionSeries>();
        require_send::<engine::Partition>();
        require_sync::<engine::Partition>();
        require_send::<engine::StrategyRunSummary>();
        require_sync::<engine::StrategyRunSummary>();
        require_send::<engine::SignalError>();
        require_sync::<engine::SignalError>();
    }
}
