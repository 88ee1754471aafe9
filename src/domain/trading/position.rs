use crate::domain::trading::lots::{Lot, LotLedger};
use crate::domain::trading::trailing::{TrailingBuy, TrailingSell};
use chrono::NaiveDate;

/// Mutable per-symbol simulation state: the lot ledger, running extrema,
/// execution anchors, consecutive counters and both trailing machines.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub ledger: LotLedger,
    /// Running extrema since the last lot-affecting event; reset to the
    /// execution price on any fill.
    pub recent_peak: f64,
    pub recent_bottom: f64,
    pub last_buy_price: Option<f64>,
    pub last_sell_price: Option<f64>,
    /// Most recent fill of either direction; dynamic-grid reference.
    pub last_execution_price: Option<f64>,
    pub consecutive_buy_count: u32,
    pub consecutive_sell_count: u32,
    pub trailing_buy: TrailingBuy,
    pub trailing_sell: TrailingSell,
    pub realized_pnl: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ledger: LotLedger::new(),
            recent_peak: 0.0,
            recent_bottom: 0.0,
            last_buy_price: None,
            last_sell_price: None,
            last_execution_price: None,
            consecutive_buy_count: 0,
            consecutive_sell_count: 0,
            trailing_buy: TrailingBuy::Idle,
            trailing_sell: TrailingSell::Idle,
            realized_pnl: 0.0,
        }
    }

    /// Applies a filled buy: appends the lot, advances the buy run,
    /// resets extrema to the fill price and disarms the trailing buy.
    pub fn record_buy(&mut self, date: NaiveDate, price: f64, cash_budget: f64) -> Lot {
        let lot = self.ledger.add_lot(date, price, cash_budget).clone();
        self.last_buy_price = Some(price);
        self.last_execution_price = Some(price);
        self.consecutive_buy_count += 1;
        self.consecutive_sell_count = 0;
        self.reset_extrema(price);
        self.trailing_buy = TrailingBuy::Idle;
        lot
    }

    /// Applies a filled sell over `lot_ids`: removes the lots, realizes
    /// PnL against each lot's own entry price, advances the sell run and
    /// disarms the trailing sell. Returns `(shares_sold, realized_pnl)`.
    pub fn record_sell(&mut self, price: f64, lot_ids: &[u64]) -> (f64, f64) {
        let mut shares = 0.0;
        let mut pnl = 0.0;
        for &id in lot_ids {
            if let Some(lot) = self.ledger.remove(id) {
                shares += lot.shares;
                pnl += (price - lot.entry_price) * lot.shares;
            }
        }
        self.realized_pnl += pnl;
        self.last_sell_price = Some(price);
        self.last_execution_price = Some(price);
        self.consecutive_sell_count += 1;
        self.consecutive_buy_count = 0;
        self.reset_extrema(price);
        self.trailing_sell = TrailingSell::Idle;
        (shares, pnl)
    }

    pub fn reset_extrema(&mut self, price: f64) {
        self.recent_peak = price;
        self.recent_bottom = price;
    }

    /// End-of-bar extrema advance; runs after all same-day decisions.
    pub fn advance_extrema(&mut self, price: f64) {
        self.recent_peak = self.recent_peak.max(price);
        self.recent_bottom = self.recent_bottom.min(price);
    }

    pub fn lots_snapshot(&self) -> Vec<Lot> {
        self.ledger.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_buy_resets_extrema_and_counters() {
        let mut pos = Position::new("TEST");
        pos.recent_peak = 120.0;
        pos.recent_bottom = 85.0;
        pos.consecutive_sell_count = 3;

        pos.record_buy(date("2024-01-05"), 90.0, 1000.0);

        assert_eq!(pos.recent_peak, 90.0);
        assert_eq!(pos.recent_bottom, 90.0);
        assert_eq!(pos.consecutive_buy_count, 1);
        assert_eq!(pos.consecutive_sell_count, 0);
        assert_eq!(pos.last_buy_price, Some(90.0));
        assert_eq!(pos.ledger.len(), 1);
    }

    #[test]
    fn test_record_sell_realizes_per_lot_pnl() {
        let mut pos = Position::new("TEST");
        let a = pos.record_buy(date("2024-01-05"), 100.0, 1000.0).id;
        let b = pos.record_buy(date("2024-01-06"), 80.0, 1000.0).id;

        let (shares, pnl) = pos.record_sell(110.0, &[a, b]);

        // 10 shares of the 100 lot, 12.5 of the 80 lot
        assert!((shares - 22.5).abs() < 1e-9);
        // 10*10 + 12.5*30
        assert!((pnl - 475.0).abs() < 1e-9);
        assert!(pos.ledger.is_empty());
        assert_eq!(pos.consecutive_sell_count, 1);
        assert_eq!(pos.consecutive_buy_count, 0);
        assert_eq!(pos.last_sell_price, Some(110.0));
    }

    #[test]
    fn test_counters_never_both_positive() {
        let mut pos = Position::new("TEST");
        pos.record_buy(date("2024-01-05"), 100.0, 1000.0);
        pos.record_buy(date("2024-01-06"), 90.0, 1000.0);
        assert_eq!(pos.consecutive_buy_count, 2);

        let id = pos.ledger.iter().next().map(|l| l.id).unwrap();
        pos.record_sell(120.0, &[id]);

        assert_eq!(pos.consecutive_buy_count, 0);
        assert_eq!(pos.consecutive_sell_count, 1);
    }

    #[test]
    fn test_stale_lot_handles_are_skipped() {
        let mut pos = Position::new("TEST");
        let a = pos.record_buy(date("2024-01-05"), 100.0, 1000.0).id;
        pos.ledger.remove(a);

        let (shares, pnl) = pos.record_sell(120.0, &[a]);
        assert_eq!(shares, 0.0);
        assert_eq!(pnl, 0.0);
    }
}
