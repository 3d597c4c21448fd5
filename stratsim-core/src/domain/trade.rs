//! Trade — a reconstructed round trip (or an unresolved open position).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    Closed,
    Open,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Open => "Open",
        }
    }
}

/// One trade reconstructed from a Buy/Sell action pair.
///
/// Open trades have no `sell_date`; their `sell_price` is the last close of
/// the series, used only to mark the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub ticker: String,
    pub strategy: String,
    pub status: TradeStatus,

    // ── Entry / exit ──
    pub buy_date: NaiveDate,
    pub buy_price: f64,
    pub sell_date: Option<NaiveDate>,
    pub sell_price: f64,

    // ── Raw result ──
    pub profit: f64,
    pub profit_percent: f64,
    pub gain_factor: f64,

    // ── Commission-adjusted ──
    pub buy_price_commission: f64,
    pub sell_price_commission: f64,
    pub profit_commission: f64,
    pub profit_percent_commission: f64,
    pub gain_factor_commission: f64,
}

/// Proportional transaction costs applied to both legs of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionModel {
    pub entry_rate: f64,
    pub exit_rate: f64,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self {
            entry_rate: 0.0006,
            exit_rate: 0.0006,
        }
    }
}

impl CommissionModel {
    pub fn zero() -> Self {
        Self {
            entry_rate: 0.0,
            exit_rate: 0.0,
        }
    }

    /// Effective price paid on entry.
    pub fn entry_price(&self, price: f64) -> f64 {
        price * (1.0 + self.entry_rate)
    }

    /// Effective price received on exit.
    pub fn exit_price(&self, price: f64) -> f64 {
        price * (1.0 - self.exit_rate)
    }
}

/// Identity used for duplicate detection: one strategy cannot open the same
/// ticker twice on the same day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradeKey {
    pub ticker: String,
    pub strategy: String,
    pub buy_date: NaiveDate,
}

impl Trade {
    /// Build a trade and derive every raw and commission-adjusted field.
    ///
    /// `sell_date = None` marks an open trade marked at `sell_price`.
    pub fn new(
        ticker: impl Into<String>,
        strategy: impl Into<String>,
        buy_date: NaiveDate,
        buy_price: f64,
        sell_date: Option<NaiveDate>,
        sell_price: f64,
        commission: &CommissionModel,
    ) -> Self {
        let status = if sell_date.is_some() {
            TradeStatus::Closed
        } else {
            TradeStatus::Open
        };
        let profit = sell_price - buy_price;
        let buy_price_commission = commission.entry_price(buy_price);
        let sell_price_commission = commission.exit_price(sell_price);
        let profit_commission = sell_price_commission - buy_price_commission;

        Self {
            ticker: ticker.into(),
            strategy: strategy.into(),
            status,
            buy_date,
            buy_price,
            sell_date,
            sell_price,
            profit,
            profit_percent: profit / buy_price * 100.0,
            gain_factor: sell_price / buy_price,
            buy_price_commission,
            sell_price_commission,
            profit_commission,
            profit_percent_commission: profit_commission / buy_price_commission * 100.0,
            gain_factor_commission: sell_price_commission / buy_price_commission,
        }
    }

    pub fn key(&self) -> TradeKey {
        TradeKey {
            ticker: self.ticker.clone(),
            strategy: self.strategy.clone(),
            buy_date: self.buy_date,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_winner(&self) -> bool {
        self.profit_commission > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.profit_commission < 0.0
    }

    /// Sell date for ordering purposes: open trades sort after every real date.
    pub fn effective_sell_date(&self) -> NaiveDate {
        self.sell_date.unwrap_or(NaiveDate::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn sample_trade() -> Trade {
        Trade::new(
            "BBOB",
            "RSI Strategy",
            date(1, 5),
            100.0,
            Some(date(1, 11)),
            110.0,
            &CommissionModel::default(),
        )
    }

    #[test]
    fn commission_adjusted_fields() {
        let t = sample_trade();
        assert_eq!(t.status, TradeStatus::Closed);
        assert!((t.buy_price_commission - 100.06).abs() < 1e-9);
        assert!((t.sell_price_commission - 109.934).abs() < 1e-9);
        assert!((t.profit_commission - 9.874).abs() < 1e-9);
        assert!((t.gain_factor_commission - 109.934 / 100.06).abs() < 1e-12);
        assert!((t.profit_percent_commission - 9.874 / 100.06 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn raw_fields_ignore_commission() {
        let t = sample_trade();
        assert!((t.profit - 10.0).abs() < 1e-12);
        assert!((t.profit_percent - 10.0).abs() < 1e-9);
        assert!((t.gain_factor - 1.1).abs() < 1e-12);
    }

    #[test]
    fn zero_commission_matches_raw() {
        let t = Trade::new("X", "S", date(1, 1), 50.0, Some(date(1, 2)), 55.0, &CommissionModel::zero());
        assert_eq!(t.gain_factor, t.gain_factor_commission);
        assert_eq!(t.profit, t.profit_commission);
    }

    #[test]
    fn missing_sell_date_is_open() {
        let t = Trade::new("X", "S", date(1, 1), 50.0, None, 48.0, &CommissionModel::default());
        assert_eq!(t.status, TradeStatus::Open);
        assert!(t.is_loser());
    }

    #[test]
    fn winner_uses_commission_adjusted_profit() {
        let mut t = sample_trade();
        assert!(t.is_winner());
        t.profit = 0.05;
        t.profit_commission = -0.07;
        assert!(!t.is_winner());
        assert!(t.is_loser());
    }

    #[test]
    fn open_trade_sorts_after_real_dates() {
        let t = Trade::new("X", "S", date(1, 1), 50.0, None, 52.0, &CommissionModel::default());
        assert!(t.is_open());
        assert_eq!(t.effective_sell_date(), NaiveDate::MAX);
    }

    #[test]
    fn key_ignores_prices() {
        let a = sample_trade();
        let mut b = sample_trade();
        b.buy_price = 55.0;
        assert_eq!(a.key(), b.key());
    }
}
