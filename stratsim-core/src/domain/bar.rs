//! Bar — one trading day of prices plus precomputed indicator values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column names under which the price fields are addressable in predicates.
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";

/// The four price columns every indicator table carries.
pub const PRICE_COLUMNS: [&str; 4] = [OPEN, HIGH, LOW, CLOSE];

/// OHLC bar for a single ticker on a single day.
///
/// Indicator values are keyed by their source column name (`RSI_14`, `ATR`,
/// `MACDh_12_26_9`, ...). Warm-up periods are stored as `f64::NAN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            indicators: HashMap::new(),
        }
    }

    /// Builder-style indicator insertion, mostly for tests and fixtures.
    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }

    /// Value of a named column: a price field or an indicator.
    ///
    /// Returns `None` when the column is absent from this bar. NaN values are
    /// returned as-is; callers decide what NaN means.
    pub fn value(&self, column: &str) -> Option<f64> {
        match column {
            OPEN => Some(self.open),
            HIGH => Some(self.high),
            LOW => Some(self.low),
            CLOSE => Some(self.close),
            _ => self.indicators.get(column).copied(),
        }
    }

    /// True when the close can open or mark a position.
    pub fn has_tradable_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
