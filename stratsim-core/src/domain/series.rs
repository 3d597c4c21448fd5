//! IndicatorSeries — one ticker's full indicator table, loaded up front.

use super::bar::{Bar, PRICE_COLUMNS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ordered bars for one ticker plus the column names of the source table.
///
/// Column presence is a property of the table, not of individual bars: a
/// column that exists but is NaN during warm-up is still "present".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub ticker: String,
    pub columns: BTreeSet<String>,
    pub bars: Vec<Bar>,
}

impl IndicatorSeries {
    pub fn new(ticker: impl Into<String>, columns: BTreeSet<String>, bars: Vec<Bar>) -> Self {
        Self {
            ticker: ticker.into(),
            columns,
            bars,
        }
    }

    /// Build a series whose column set is inferred from the bars themselves
    /// (price columns plus the union of every bar's indicator keys).
    pub fn from_bars(ticker: impl Into<String>, bars: Vec<Bar>) -> Self {
        let mut columns: BTreeSet<String> = PRICE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for bar in &bars {
            columns.extend(bar.indicators.keys().cloned());
        }
        Self::new(ticker, columns, bars)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Required columns absent from this table, in the order given.
    pub fn missing_columns<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required
            .into_iter()
            .filter(|c| !self.has_column(c))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }
}
