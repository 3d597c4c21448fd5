//! Indicator table loading for the runner.
//!
//! One CSV per ticker, `indicators_{TICKER}.csv`, with a `Date` column, the
//! four price columns and any number of indicator columns. Loading is
//! forgiving about cell contents (anything non-numeric reads as NaN) and
//! strict about structure (missing price columns or bad dates fail the
//! ticker).

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use stratsim_core::domain::bar::{CLOSE, HIGH, LOW, OPEN, PRICE_COLUMNS};
use stratsim_core::domain::{Bar, IndicatorSeries};

use crate::config::DataConfig;

pub const DATE_COLUMN: &str = "Date";
const FILE_PREFIX: &str = "indicators_";
const FILE_SUFFIX: &str = ".csv";

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: String, column: String },

    #[error("{path}: row {row}: cannot parse date '{value}'")]
    BadDate {
        path: String,
        row: usize,
        value: String,
    },
}

/// File name of a ticker's indicator table.
pub fn indicator_file_name(ticker: &str) -> String {
    format!("{FILE_PREFIX}{ticker}{FILE_SUFFIX}")
}

/// Every ticker with an indicator table in `dir`, sorted.
pub fn discover_tickers(dir: &Path) -> Result<Vec<String>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut tickers = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(ticker) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
        {
            if !ticker.is_empty() {
                tickers.insert(ticker.to_string());
            }
        }
    }
    Ok(tickers.into_iter().collect())
}

/// Parse `YYYY-MM-DD`, dropping any trailing time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().split(['T', ' ']).next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Empty, `nan` and unparseable cells all read as NaN.
fn parse_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse one indicator table. `source` names the input in error messages.
pub fn parse_indicator_csv<R: Read>(
    ticker: &str,
    reader: R,
    source: &str,
) -> Result<IndicatorSeries, LoadError> {
    let csv_err = |e| LoadError::Csv {
        path: source.to_string(),
        source: e,
    };
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();

    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    let required = |column: &str| {
        index
            .get(column)
            .copied()
            .ok_or_else(|| LoadError::MissingColumn {
                path: source.to_string(),
                column: column.to_string(),
            })
    };
    let date_idx = required(DATE_COLUMN)?;
    let open_idx = required(OPEN)?;
    let high_idx = required(HIGH)?;
    let low_idx = required(LOW)?;
    let close_idx = required(CLOSE)?;

    let indicator_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h != DATE_COLUMN && !PRICE_COLUMNS.contains(h) && !h.is_empty())
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut bars: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
    let mut duplicates = 0usize;

    for (row_no, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let cell = |i: usize| record.get(i).unwrap_or("");
        let raw_date = cell(date_idx);
        let date = parse_date(raw_date).ok_or_else(|| LoadError::BadDate {
            path: source.to_string(),
            row: row_no + 1,
            value: raw_date.to_string(),
        })?;

        let mut bar = Bar::new(
            date,
            parse_value(cell(open_idx)),
            parse_value(cell(high_idx)),
            parse_value(cell(low_idx)),
            parse_value(cell(close_idx)),
        );
        for (i, name) in &indicator_cols {
            bar.indicators.insert(name.clone(), parse_value(cell(*i)));
        }
        if bars.insert(date, bar).is_some() {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        warn!(ticker, source, duplicates, "duplicate dates, keeping the last row of each");
    }

    let columns: BTreeSet<String> = headers
        .iter()
        .filter(|h| *h != DATE_COLUMN && !h.is_empty())
        .map(str::to_string)
        .collect();
    Ok(IndicatorSeries::new(ticker, columns, bars.into_values().collect()))
}

/// Load `indicators_{ticker}.csv` from `dir`.
pub fn load_series(dir: &Path, ticker: &str) -> Result<IndicatorSeries, LoadError> {
    let path = dir.join(indicator_file_name(ticker));
    let file = std::fs::File::open(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let series = parse_indicator_csv(ticker, file, &path.display().to_string())?;
    debug!(ticker, bars = series.len(), columns = series.columns.len(), "loaded indicator table");
    Ok(series)
}

/// Keep bars in `(as_of - lookback_days, as_of]`. Without `as_of` the newest
/// bar of the series is the reference. A lookback reaching past the earliest
/// representable date has no lower bound.
pub fn apply_window(
    mut series: IndicatorSeries,
    lookback_days: Option<u32>,
    as_of: Option<NaiveDate>,
) -> IndicatorSeries {
    let Some(reference) = as_of.or_else(|| series.last_bar().map(|b| b.date)) else {
        return series;
    };
    let start = lookback_days
        .and_then(|days| reference.checked_sub_signed(Duration::days(i64::from(days))));
    series
        .bars
        .retain(|b| b.date <= reference && start.map_or(true, |s| b.date > s));
    series
}

/// A ticker whose table could not be used.
#[derive(Debug)]
pub struct LoadFailure {
    pub ticker: String,
    pub error: LoadError,
}

/// Result of loading every configured ticker.
#[derive(Debug)]
pub struct LoadedData {
    pub series: Vec<IndicatorSeries>,
    pub failures: Vec<LoadFailure>,
    /// BLAKE3 over every loaded bar, for provenance.
    pub dataset_hash: String,
}

/// Load every ticker named by the config, or every table found in the input
/// directory when none are named. A broken table skips that ticker only; an
/// unreadable input directory fails the whole load.
pub fn load_all(cfg: &DataConfig) -> Result<LoadedData, LoadError> {
    let tickers = if cfg.tickers.is_empty() {
        discover_tickers(&cfg.input_dir)?
    } else {
        cfg.tickers.clone()
    };

    let mut series = Vec::with_capacity(tickers.len());
    let mut failures = Vec::new();
    for ticker in tickers {
        match load_series(&cfg.input_dir, &ticker) {
            Ok(s) => series.push(apply_window(s, cfg.lookback_days, cfg.as_of)),
            Err(error) => {
                warn!(%ticker, %error, "skipping ticker");
                failures.push(LoadFailure { ticker, error });
            }
        }
    }

    let dataset_hash = compute_dataset_hash(&series);
    Ok(LoadedData {
        series,
        failures,
        dataset_hash,
    })
}

/// Deterministic BLAKE3 hash over tickers, dates, prices and indicator values
/// in sorted order.
fn compute_dataset_hash(series: &[IndicatorSeries]) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut ordered: Vec<&IndicatorSeries> = series.iter().collect();
    ordered.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    for s in ordered {
        hasher.update(s.ticker.as_bytes());
        for bar in &s.bars {
            hasher.update(bar.date.to_string().as_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close] {
                hasher.update(&v.to_le_bytes());
            }
            let mut names: Vec<&String> = bar.indicators.keys().collect();
            names.sort();
            for name in names {
                hasher.update(name.as_bytes());
                if let Some(v) = bar.indicators.get(name) {
                    hasher.update(&v.to_le_bytes());
                }
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
