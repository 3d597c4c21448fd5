//! Batch runner — every (ticker, strategy) pair, then one simulation per strategy.
//!
//! Two entry points:
//! - `run_batch()`: loads indicator tables per the config, then runs. Used by the CLI.
//! - `run_series()`: takes pre-loaded series. No I/O, used by tests and benches.
//!
//! Per-pair failures never abort the batch: the pair is logged, recorded as
//! skipped and left out of aggregation.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use stratsim_core::domain::{CommissionModel, IndicatorSeries, Trade};
use stratsim_core::engine::{
    extract_trades, generate_actions, simulate, ActionSeries, PartitionScope, Simulation,
};
use stratsim_core::strategy::StrategySpec;

use crate::config::{ConfigError, ResolvedConfig};
use crate::data_loader::{load_all, LoadError};

/// Errors that abort a batch.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
}

/// Output of one (ticker, strategy) pair.
#[derive(Debug, Clone)]
pub struct PairResult {
    pub ticker: String,
    pub strategy: String,
    pub actions: ActionSeries,
    pub trades: Vec<Trade>,
}

/// Something the batch left out, with the reason. `strategy` is empty when a
/// whole ticker failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRun {
    pub ticker: String,
    pub strategy: String,
    pub reason: String,
}

/// Settings the batch needs beyond the series and strategies.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub commission: CommissionModel,
    pub parallel: bool,
    pub partition_scope: PartitionScope,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            commission: CommissionModel::default(),
            parallel: true,
            partition_scope: PartitionScope::Merged,
        }
    }
}

/// Everything a batch produced.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Input series, sorted by ticker.
    pub series: Vec<IndicatorSeries>,
    /// Strategies in the order they were configured.
    pub strategies: Vec<String>,
    /// Successful pairs, sorted by (ticker, strategy).
    pub pairs: Vec<PairResult>,
    /// One simulation per strategy, in configured order.
    pub simulations: Vec<Simulation>,
    /// Skipped pairs, failed tickers and rejected trades.
    pub skipped: Vec<SkippedRun>,
    pub config_fingerprint: String,
    pub dataset_hash: String,
}

impl BatchResult {
    /// Pairs of one ticker, in strategy-name order.
    pub fn pairs_for_ticker<'a>(&'a self, ticker: &'a str) -> impl Iterator<Item = &'a PairResult> + 'a {
        self.pairs.iter().filter(move |p| p.ticker == ticker)
    }

    pub fn pair(&self, ticker: &str, strategy: &str) -> Option<&PairResult> {
        self.pairs
            .iter()
            .find(|p| p.ticker == ticker && p.strategy == strategy)
    }
}

/// Run one pair. Sequential by construction.
fn run_pair(
    series: &IndicatorSeries,
    spec: &StrategySpec,
    commission: &CommissionModel,
) -> Result<PairResult, SkippedRun> {
    let actions = generate_actions(series, spec).map_err(|e| {
        warn!(ticker = %series.ticker, strategy = %spec.name, error = %e, "skipping pair");
        SkippedRun {
            ticker: series.ticker.clone(),
            strategy: spec.name.clone(),
            reason: e.to_string(),
        }
    })?;
    let trades = extract_trades(&series.bars, &actions.actions, &series.ticker, &spec.name, commission);
    info!(
        ticker = %series.ticker,
        strategy = %spec.name,
        bars = series.len(),
        trades = trades.len(),
        "pair complete"
    );
    Ok(PairResult {
        ticker: series.ticker.clone(),
        strategy: spec.name.clone(),
        actions,
        trades,
    })
}

/// Run every strategy against pre-loaded series. No I/O.
pub fn run_series(
    mut series: Vec<IndicatorSeries>,
    strategies: &[StrategySpec],
    opts: &BatchOptions,
) -> BatchResult {
    series.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    let jobs: Vec<(&IndicatorSeries, &StrategySpec)> = series
        .iter()
        .flat_map(|s| strategies.iter().map(move |spec| (s, spec)))
        .collect();

    let outcomes: Vec<Result<PairResult, SkippedRun>> = if opts.parallel {
        jobs.par_iter()
            .map(|(s, spec)| run_pair(s, spec, &opts.commission))
            .collect()
    } else {
        jobs.iter()
            .map(|(s, spec)| run_pair(s, spec, &opts.commission))
            .collect()
    };

    let mut pairs = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(pair) => pairs.push(pair),
            Err(skip) => skipped.push(skip),
        }
    }
    pairs.sort_by(|a, b| (&a.ticker, &a.strategy).cmp(&(&b.ticker, &b.strategy)));
    skipped.sort_by(|a, b| (&a.ticker, &a.strategy).cmp(&(&b.ticker, &b.strategy)));

    let pooled: Vec<(&StrategySpec, Vec<Trade>)> = strategies
        .iter()
        .map(|spec| {
            let trades = pairs
                .iter()
                .filter(|p| p.strategy == spec.name)
                .flat_map(|p| p.trades.iter().cloned())
                .collect();
            (spec, trades)
        })
        .collect();

    let simulations: Vec<Simulation> = if opts.parallel {
        pooled
            .into_par_iter()
            .map(|(spec, trades)| simulate(&spec.name, trades, opts.partition_scope))
            .collect()
    } else {
        pooled
            .into_iter()
            .map(|(spec, trades)| simulate(&spec.name, trades, opts.partition_scope))
            .collect()
    };

    for sim in &simulations {
        for rejected in &sim.partition.rejected {
            skipped.push(SkippedRun {
                ticker: rejected.trade.ticker.clone(),
                strategy: sim.strategy.clone(),
                reason: rejected.error.to_string(),
            });
        }
    }

    BatchResult {
        series,
        strategies: strategies.iter().map(|s| s.name.clone()).collect(),
        pairs,
        simulations,
        skipped,
        config_fingerprint: String::new(),
        dataset_hash: String::new(),
    }
}

/// Load the configured tickers and run the batch.
pub fn run_batch(resolved: &ResolvedConfig) -> Result<BatchResult, RunError> {
    let cfg = &resolved.config;
    let loaded = load_all(&cfg.data)?;
    info!(
        tickers = loaded.series.len(),
        failed = loaded.failures.len(),
        strategies = resolved.strategies.len(),
        dataset_hash = %loaded.dataset_hash,
        "indicator tables loaded"
    );

    let opts = BatchOptions {
        commission: cfg.commission,
        parallel: cfg.run.parallel,
        partition_scope: cfg.run.partition_scope,
    };
    let mut result = run_series(loaded.series, &resolved.strategies, &opts);

    let mut skipped: Vec<SkippedRun> = loaded
        .failures
        .into_iter()
        .map(|f| SkippedRun {
            ticker: f.ticker,
            strategy: String::new(),
            reason: f.error.to_string(),
        })
        .collect();
    skipped.append(&mut result.skipped);
    result.skipped = skipped;
    result.config_fingerprint = resolved.fingerprint.clone();
    result.dataset_hash = loaded.dataset_hash;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stratsim_core::domain::Bar;
    use stratsim_core::strategy::find_builtin;

    fn series(ticker: &str, closes: &[f64], rsi: &[f64]) -> IndicatorSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .zip(rsi)
            .enumerate()
            .map(|(i, (&c, &r))| {
                Bar::new(start + chrono::Duration::days(i as i64), c, c, c, c)
                    .with_indicator("RSI_14", r)
                    .with_indicator("ATR", 3.0)
            })
            .collect();
        IndicatorSeries::from_bars(ticker, bars)
    }

    fn specs(names: &[&str]) -> Vec<StrategySpec> {
        names.iter().map(|n| find_builtin(n).unwrap()).collect()
    }

    #[test]
    fn missing_indicator_skips_pair_not_batch() {
        let input = vec![series("ZZZ", &[100.0, 98.0, 110.0], &[40.0, 30.0, 70.0])];
        let result = run_series(
            input,
            &specs(&["RSI Strategy", "RSICMF Strategy"]),
            &BatchOptions::default(),
        );
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].strategy, "RSICMF Strategy");
        assert!(result.skipped[0].reason.contains("CMF_20"));
        assert_eq!(result.simulations.len(), 2);
        assert_eq!(result.simulations[1].summary.total_trades, 0);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let input = vec![
            series("BBB", &[100.0, 98.0, 96.0, 110.0, 108.0], &[40.0, 30.0, 28.0, 70.0, 72.0]),
            series("AAA", &[50.0, 49.0, 55.0, 54.0], &[30.0, 50.0, 70.0, 20.0]),
        ];
        let strategies = specs(&["RSI Strategy", "RSI Strategy2"]);
        let par = run_series(input.clone(), &strategies, &BatchOptions::default());
        let seq = run_series(
            input,
            &strategies,
            &BatchOptions {
                parallel: false,
                ..BatchOptions::default()
            },
        );

        let keys = |r: &BatchResult| -> Vec<(String, String, usize)> {
            r.pairs
                .iter()
                .map(|p| (p.ticker.clone(), p.strategy.clone(), p.trades.len()))
                .collect()
        };
        assert_eq!(keys(&par), keys(&seq));
        assert_eq!(par.pairs[0].ticker, "AAA");
        for (a, b) in par.simulations.iter().zip(&seq.simulations) {
            assert_eq!(a.summary, b.summary);
        }
    }

    #[test]
    fn trades_pool_across_tickers_per_strategy() {
        let input = vec![
            series("AAA", &[100.0, 98.0, 96.0, 110.0, 108.0], &[40.0, 30.0, 28.0, 70.0, 72.0]),
            series("BBB", &[100.0, 98.0, 96.0, 110.0, 108.0], &[40.0, 30.0, 28.0, 70.0, 72.0]),
        ];
        let result = run_series(input, &specs(&["RSI Strategy"]), &BatchOptions::default());
        let summary = &result.simulations[0].summary;
        assert_eq!(summary.total_trades, 2);
        // Same dates on both tickers: the trades overlap, so two iterations.
        assert_eq!(summary.iteration_count, 2);
    }

    #[test]
    fn pair_lookup() {
        let input = vec![series("AAA", &[100.0, 98.0], &[40.0, 30.0])];
        let result = run_series(input, &specs(&["RSI Strategy"]), &BatchOptions::default());
        assert!(result.pair("AAA", "RSI Strategy").is_some());
        assert!(result.pair("AAA", "MACD Strategy").is_none());
        assert_eq!(result.pairs_for_ticker("AAA").count(), 1);
    }
}
