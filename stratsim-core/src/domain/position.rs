use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Levels tracked while a position is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// ATR trailing stop. Ratchets upward only; `None` until a valid ATR is seen
    /// or when the strategy has no ATR stop.
    pub trailing_stop: Option<f64>,
    /// Fixed percentage floor below the entry price.
    pub secondary_stop: Option<f64>,
    pub take_profit: Option<f64>,
}

impl OpenPosition {
    /// The stop level in force: the higher of the trailing and secondary stops.
    pub fn effective_stop(&self) -> Option<f64> {
        match (self.trailing_stop, self.secondary_stop) {
            (Some(t), Some(s)) => Some(t.max(s)),
            (Some(t), None) => Some(t),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }

    /// Raise the trailing stop to `candidate` if that tightens it.
    pub fn ratchet(self, candidate: f64) -> Self {
        if !candidate.is_finite() {
            return self;
        }
        let trailing_stop = Some(match self.trailing_stop {
            Some(current) => current.max(candidate),
            None => candidate,
        });
        Self {
            trailing_stop,
            ..self
        }
    }
}

/// Position state threaded through one (ticker, strategy) bar scan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            Self::Open(p) => Some(p),
            Self::Flat => None,
        }
    }
}
