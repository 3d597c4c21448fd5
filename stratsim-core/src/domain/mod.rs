//! Domain types for stratsim

pub mod action;
pub mod bar;
pub mod position;
pub mod series;
pub mod trade;

pub use action::{Action, ExitReason, UnknownAction};
pub use bar::Bar;
pub use position::{OpenPosition, PositionState};
pub use series::IndicatorSeries;
pub use trade::{CommissionModel, Trade, TradeKey, TradeStatus};

