//! CSV export of batch results.
//!
//! Column names are the output schema; downstream spreadsheets key on them.
//! Every table renders to a `String` first so it can be tested without
//! touching the filesystem; `save_outputs` writes the full set.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stratsim_core::domain::{IndicatorSeries, Trade};
use stratsim_core::engine::{simulation_rows, ActionSeries, Simulation};
use stratsim_core::strategy::alt_state::{derive_alt_states, derive_alt_states_from_labels};

use crate::runner::{BatchResult, PairResult, SkippedRun};

const TRADE_COLUMNS: [&str; 15] = [
    "Ticker",
    "Strategy",
    "Buy Date",
    "Sell Date",
    "Buy Price",
    "Sell Price",
    "Profit",
    "Profit Percent",
    "Gain Factor",
    "Trade Status",
    "Buy Price Commission",
    "Sell Price Commission",
    "Profit Commission",
    "Profit Percent Commission",
    "Gain Factor Commission",
];

/// File-system friendly form of a strategy name: `"RSI Strategy2"` → `rsi_strategy2`.
pub fn strategy_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn num(v: f64) -> String {
    format!("{v:.6}")
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn trade_fields(t: &Trade) -> Vec<String> {
    vec![
        t.ticker.clone(),
        t.strategy.clone(),
        t.buy_date.to_string(),
        t.sell_date.map(|d| d.to_string()).unwrap_or_default(),
        num(t.buy_price),
        num(t.sell_price),
        num(t.profit),
        num(t.profit_percent),
        num(t.gain_factor),
        t.status.as_str().to_string(),
        num(t.buy_price_commission),
        num(t.sell_price_commission),
        num(t.profit_commission),
        num(t.profit_percent_commission),
        num(t.gain_factor_commission),
    ]
}

/// Why the machine closed the trade, looked up on its sell date. Empty for
/// open trades.
fn exit_reason_label(actions: &ActionSeries, trade: &Trade) -> &'static str {
    trade
        .sell_date
        .and_then(|date| actions.dates.binary_search(&date).ok())
        .and_then(|idx| actions.exit_reasons.get(idx).copied().flatten())
        .map(|reason| reason.as_str())
        .unwrap_or("")
}

/// Trade table for one pair, with an `Exit Reason` column after the trade
/// fields. Open trades have an empty `Sell Date` and `Exit Reason`.
pub fn export_trades_csv(pair: &PairResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header: Vec<&str> = TRADE_COLUMNS.to_vec();
    header.push("Exit Reason");
    wtr.write_record(&header)?;
    for t in &pair.trades {
        let mut fields = trade_fields(t);
        fields.push(exit_reason_label(&pair.actions, t).to_string());
        wtr.write_record(&fields)?;
    }
    finish(wtr)
}

/// Per-ticker action table: `Date`, `Close`, then `{strategy}` and
/// `{strategy} Alt` for every strategy that ran on the ticker.
pub fn export_actions_csv(series: &IndicatorSeries, pairs: &[&PairResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["Date".to_string(), "Close".to_string()];
    for p in pairs {
        header.push(p.strategy.clone());
        header.push(format!("{} Alt", p.strategy));
    }
    wtr.write_record(&header)?;

    let alt: Vec<_> = pairs.iter().map(|p| derive_alt_states(&p.actions.actions)).collect();
    for (i, bar) in series.bars.iter().enumerate() {
        let mut row = vec![bar.date.to_string(), num(bar.close)];
        for (p, states) in pairs.iter().zip(&alt) {
            row.push(p.actions.actions.get(i).map(|a| a.as_str()).unwrap_or("").to_string());
            row.push(states.get(i).map(|s| s.as_str()).unwrap_or("").to_string());
        }
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Simulation table for one strategy: every assigned trade in canonical
/// order, its iteration, and the running compounded return of that
/// iteration under an `Iteration {n}` column.
pub fn export_simulation_csv(sim: &Simulation) -> Result<String> {
    let rows = simulation_rows(&sim.partition);
    let n_iter = sim.partition.iterations.len();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header: Vec<String> = TRADE_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.push("Simulation Status".into());
    header.push("Trade Iteration Number".into());
    header.extend((1..=n_iter).map(|i| format!("Iteration {i}")));
    wtr.write_record(&header)?;

    for row in &rows {
        let mut fields = trade_fields(&row.trade);
        fields.push(row.simulated.to_string());
        fields.push(row.iteration.to_string());
        for i in 1..=n_iter {
            fields.push(if i == row.iteration {
                num(row.running_return)
            } else {
                String::new()
            });
        }
        wtr.write_record(&fields)?;
    }
    finish(wtr)
}

/// One row per strategy with the run summary and per-iteration columns.
pub fn export_summary_csv(
    simulations: &[Simulation],
    config_fingerprint: &str,
    dataset_hash: &str,
) -> Result<String> {
    let max_iter = simulations
        .iter()
        .map(|s| s.summary.iteration_count)
        .max()
        .unwrap_or(0);

    let mut header: Vec<String> = [
        "Strategy",
        "Number of Trades",
        "Number of Closed Trades",
        "Number of Open Trades",
        "Number of Winning Trades",
        "Number of Losing Trades",
        "Winning Trade Percent",
        "Average Profit",
        "Average Profit Percent",
        "Average Gain Factor",
        "Product of Gain Factors",
        "Simulation Result",
        "Number of Iterations",
        "Rejected Trades",
        "Config Fingerprint",
        "Dataset Hash",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    for i in 1..=max_iter {
        header.push(format!("Product of Gain Factors - Iteration {i}"));
        header.push(format!("Number of Trades - Iteration {i}"));
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&header)?;
    for sim in simulations {
        let s = &sim.summary;
        let mut row = vec![
            s.strategy.clone(),
            s.total_trades.to_string(),
            s.closed_trades.to_string(),
            s.open_trades.to_string(),
            s.winning_trades.to_string(),
            s.losing_trades.to_string(),
            num(s.win_rate),
            num(s.average_profit),
            num(s.average_profit_percent),
            num(s.average_gain_factor),
            num(s.product_of_gain_factors),
            num(s.simulation_result),
            s.iteration_count.to_string(),
            s.rejected_trades.to_string(),
            config_fingerprint.to_string(),
            dataset_hash.to_string(),
        ];
        for i in 0..max_iter {
            match s.iterations.get(i) {
                Some(it) => {
                    row.push(num(it.compounded_return));
                    row.push(it.trade_count.to_string());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Today's view: per ticker the last bar's date and close, then per
/// strategy the last action and alternative state. Skipped pairs are blank.
pub fn export_latest_actions_csv(batch: &BatchResult) -> Result<String> {
    let mut header = vec!["Ticker".to_string(), "Date".to_string(), "Close".to_string()];
    for name in &batch.strategies {
        header.push(name.clone());
        header.push(format!("{name} Alt"));
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&header)?;
    for series in &batch.series {
        let Some(last) = series.last_bar() else {
            continue;
        };
        let by_strategy: HashMap<&str, &PairResult> = batch
            .pairs_for_ticker(&series.ticker)
            .map(|p| (p.strategy.as_str(), p))
            .collect();

        let mut row = vec![series.ticker.clone(), last.date.to_string(), num(last.close)];
        for name in &batch.strategies {
            match by_strategy.get(name.as_str()) {
                Some(p) => {
                    let action = p.actions.last_action().map(|a| a.as_str()).unwrap_or("");
                    let alt = derive_alt_states(&p.actions.actions)
                        .last()
                        .map(|s| s.as_str())
                        .unwrap_or("");
                    row.push(action.to_string());
                    row.push(alt.to_string());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Re-derive every `{name} Alt` column of an action table from its `{name}`
/// column. Labels other than Buy/Sell/Hold keep the previous state, so a
/// hand-edited table still reads.
pub fn rederive_alt_columns(table: &str) -> Result<String> {
    let mut rdr = csv::Reader::from_reader(table.as_bytes());
    let headers = rdr
        .headers()
        .context("action table has no header row")?
        .clone();
    let records: Vec<csv::StringRecord> = rdr
        .records()
        .collect::<Result<_, _>>()
        .context("malformed action table")?;
    let mut rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| r.iter().map(str::to_string).collect())
        .collect();

    for (alt_idx, header) in headers.iter().enumerate() {
        let Some(name) = header.strip_suffix(" Alt") else {
            continue;
        };
        let Some(src_idx) = headers.iter().position(|h| h == name) else {
            continue;
        };
        let labels: Vec<&str> = records.iter().map(|r| r.get(src_idx).unwrap_or("")).collect();
        for (row, state) in rows.iter_mut().zip(derive_alt_states_from_labels(&labels)) {
            row[alt_idx] = state.as_str().to_string();
        }
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&headers)?;
    for row in &rows {
        wtr.write_record(row)?;
    }
    finish(wtr)
}

pub fn export_skipped_csv(skipped: &[SkippedRun]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["Ticker", "Strategy", "Reason"])?;
    for s in skipped {
        wtr.write_record([&s.ticker, &s.strategy, &s.reason])?;
    }
    finish(wtr)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Write every output table under `output_dir`. Returns the paths written.
///
/// Layout:
/// - `trades/{TICKER}/{strategy_slug}.csv`
/// - `actions/{TICKER}.csv`
/// - `simulations/{strategy_slug}.csv`
/// - `summary.csv`, `latest_actions.csv`, `skipped.csv`
pub fn save_outputs(batch: &BatchResult, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut emit = |path: PathBuf, contents: String| -> Result<()> {
        write_file(&path, &contents)?;
        written.push(path);
        Ok(())
    };

    for pair in &batch.pairs {
        let path = output_dir
            .join("trades")
            .join(&pair.ticker)
            .join(format!("{}.csv", strategy_slug(&pair.strategy)));
        emit(path, export_trades_csv(pair)?)?;
    }

    for series in &batch.series {
        let pairs: Vec<&PairResult> = batch.pairs_for_ticker(&series.ticker).collect();
        if pairs.is_empty() {
            continue;
        }
        let path = output_dir.join("actions").join(format!("{}.csv", series.ticker));
        emit(path, export_actions_csv(series, &pairs)?)?;
    }

    for sim in &batch.simulations {
        let path = output_dir
            .join("simulations")
            .join(format!("{}.csv", strategy_slug(&sim.strategy)));
        emit(path, export_simulation_csv(sim)?)?;
    }

    emit(
        output_dir.join("summary.csv"),
        export_summary_csv(&batch.simulations, &batch.config_fingerprint, &batch.dataset_hash)?,
    )?;
    emit(output_dir.join("latest_actions.csv"), export_latest_actions_csv(batch)?)?;
    emit(output_dir.join("skipped.csv"), export_skipped_csv(&batch.skipped)?)?;

    Ok(written)
}
