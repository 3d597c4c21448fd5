use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-bar trading action emitted by the signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::Hold => "Hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action label '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Buy" => Ok(Self::Buy),
            "Sell" => Ok(Self::Sell),
            "Hold" => Ok(Self::Hold),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Why an open position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Close at or below the effective stop (trailing or secondary).
    StopLoss,
    /// The strategy's exit predicate held.
    Signal,
    /// Close at or above the take-profit threshold.
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "Stop Loss",
            Self::Signal => "Signal",
            Self::TakeProfit => "Take Profit",
        }
    }
}
