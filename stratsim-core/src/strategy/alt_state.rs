//! Alternative strategy state — a monitor/hold reading of an action column.
//!
//! Where the action column says what happened on a bar, the alternative
//! state says what the holder should be doing: watching, holding or acting.

use crate::domain::Action;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading bars pinned to [`AltState::MonitorMonitor`].
pub const SEED_BARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AltState {
    #[default]
    MonitorMonitor,
    Buy,
    Sell,
    SellMonitor,
    HoldHold,
    BuyHold,
}

impl AltState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonitorMonitor => "Monitor-Monitor",
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::SellMonitor => "Sell-Monitor",
            Self::HoldHold => "Hold-Hold",
            Self::BuyHold => "Buy-Hold",
        }
    }

    /// Transition on one action.
    pub fn next(self, action: Action) -> Self {
        use AltState::*;
        match (self, action) {
            (MonitorMonitor | Sell | SellMonitor, Action::Buy) => Buy,
            (MonitorMonitor | Sell | SellMonitor, Action::Hold) => MonitorMonitor,
            (MonitorMonitor | Sell | SellMonitor, Action::Sell) => SellMonitor,
            (Buy | HoldHold | BuyHold, Action::Buy) => BuyHold,
            (Buy | HoldHold | BuyHold, Action::Hold) => HoldHold,
            (Buy | HoldHold | BuyHold, Action::Sell) => Sell,
        }
    }

    /// Transition on a raw label read back from a table; an unrecognized label
    /// keeps the current state.
    pub fn next_label(self, label: &str) -> Self {
        match label.parse::<Action>() {
            Ok(action) => self.next(action),
            Err(_) => self,
        }
    }
}

impl fmt::Display for AltState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alternative state for every bar of an action sequence.
pub fn derive_alt_states(actions: &[Action]) -> Vec<AltState> {
    scan(actions.len(), |prev, i| prev.next(actions[i]))
}

/// Same as [`derive_alt_states`] for action labels of unknown quality.
pub fn derive_alt_states_from_labels<S: AsRef<str>>(labels: &[S]) -> Vec<AltState> {
    scan(labels.len(), |prev, i| prev.next_label(labels[i].as_ref()))
}

fn scan(len: usize, step: impl Fn(AltState, usize) -> AltState) -> Vec<AltState> {
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let state = if i < SEED_BARS {
            AltState::MonitorMonitor
        } else {
            step(out[i - 1], i)
        };
        out.push(state);
    }
    out
}
