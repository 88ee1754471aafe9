//! Trailing-stop state machines.
//!
//! Both machines are two-state (`Idle` / `Armed`) tagged variants owned by
//! the position. The armed payloads hold plain numbers and frozen lot
//! handles only; they never reference lots directly, so intervening lot
//! mutations either invalidate the stop or leave it untouched.

use crate::domain::trading::transaction::OrderKind;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrailingBuy {
    #[default]
    Idle,
    Armed(TrailingBuyOrder),
}

/// An armed trailing buy. `recent_peak_reference` is frozen at activation;
/// the stop only trails down toward lower rebound targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingBuyOrder {
    pub stop_price: f64,
    pub recent_peak_reference: f64,
    pub order_kind: OrderKind,
}

impl TrailingBuyOrder {
    pub fn arm(price: f64, recent_peak: f64, rebound: f64, order_kind: OrderKind) -> Self {
        Self {
            stop_price: price * (1.0 + rebound),
            recent_peak_reference: recent_peak,
            order_kind,
        }
    }

    /// Lowers the stop when the market makes a lower rebound target.
    /// Returns whether the stop moved.
    pub fn trail_down(&mut self, price: f64, rebound: f64) -> bool {
        let target = price * (1.0 + rebound);
        if target < self.stop_price {
            self.stop_price = target;
            true
        } else {
            false
        }
    }

    /// Limit orders are cancelled once the market runs above the frozen
    /// peak reference; market orders ride on.
    pub fn should_cancel(&self, price: f64) -> bool {
        self.order_kind == OrderKind::Limit && price > self.recent_peak_reference
    }

    /// Stop condition plus the limit-price guard.
    pub fn triggered(&self, price: f64) -> bool {
        price >= self.stop_price && self.within_limit(price)
    }

    fn within_limit(&self, price: f64) -> bool {
        self.order_kind == OrderKind::Market || price <= self.recent_peak_reference
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TrailingSell {
    #[default]
    Idle,
    Armed(TrailingSellOrder),
}

/// An armed trailing sell over a frozen LIFO slice of lot handles.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingSellOrder {
    pub stop_price: f64,
    pub limit_price: f64,
    pub highest_price: f64,
    pub lots_to_sell: Vec<u64>,
    pub lot_profit_requirement: f64,
    /// Effective pullback for this arming; adaptive activation narrows it.
    pub pullback_percent: f64,
    /// Set when the adaptive downtrend path armed this stop: the profit
    /// requirement is waived at execution.
    pub profit_bypassed: bool,
    pub order_kind: OrderKind,
}

impl TrailingSellOrder {
    /// Follows a new high: the stop ratchets upward, never down.
    /// Returns whether the stop moved.
    pub fn ratchet(&mut self, price: f64) -> bool {
        if price <= self.highest_price {
            return false;
        }
        self.highest_price = price;
        let target = price * (1.0 - self.pullback_percent);
        if target > self.stop_price {
            self.stop_price = target;
            true
        } else {
            false
        }
    }

    /// Stop condition plus the limit-price guard.
    pub fn triggered(&self, price: f64) -> bool {
        price <= self.stop_price
            && (self.order_kind == OrderKind::Market || price >= self.limit_price)
    }
}
