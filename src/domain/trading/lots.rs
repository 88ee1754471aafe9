use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One purchase unit. `cost_basis` always reproduces
/// `shares * entry_price` within 1e-9 relative tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    /// Stable handle assigned by the ledger; survives removals of other
    /// lots, so trailing stops can freeze lot references safely.
    #[serde(skip)]
    pub id: u64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub shares: f64,
    pub cost_basis: f64,
}

/// Owns the open lots of a position, in insertion (buy) order.
///
/// The ledger is cash-agnostic: capital gating happens in the simulators,
/// the ledger only does lot bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct LotLedger {
    lots: Vec<Lot>,
    next_id: u64,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a lot funded with `cash_budget` at `entry_price`.
    pub fn add_lot(&mut self, entry_date: NaiveDate, entry_price: f64, cash_budget: f64) -> &Lot {
        let id = self.next_id;
        self.next_id += 1;
        self.lots.push(Lot {
            id,
            entry_date,
            entry_price,
            shares: cash_budget / entry_price,
            cost_basis: cash_budget,
        });
        self.lots.last().expect("lot just appended")
    }

    /// Removes a lot by handle. Returns `None` if the handle is stale.
    pub fn remove(&mut self, id: u64) -> Option<Lot> {
        let idx = self.lots.iter().position(|l| l.id == id)?;
        Some(self.lots.remove(idx))
    }

    pub fn get(&self, id: u64) -> Option<&Lot> {
        self.lots.iter().find(|l| l.id == id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// LIFO selection: most expensive eligible lots first, ties broken by
    /// the more recent entry date, then by the later insertion. Returns at
    /// most `max_lots_to_sell` handles.
    pub fn select_lifo(&self, eligible: &[u64], max_lots_to_sell: usize) -> Vec<u64> {
        let mut candidates: Vec<&Lot> = self
            .lots
            .iter()
            .filter(|l| eligible.contains(&l.id))
            .collect();
        candidates.sort_by(|a, b| {
            b.entry_price
                .partial_cmp(&a.entry_price)
                .unwrap_or(Ordering::Equal)
                .then(b.entry_date.cmp(&a.entry_date))
                .then(b.id.cmp(&a.id))
        });
        candidates
            .into_iter()
            .take(max_lots_to_sell)
            .map(|l| l.id)
            .collect()
    }

    pub fn total_shares(&self) -> f64 {
        self.lots.iter().map(|l| l.shares).sum()
    }

    /// Cost basis currently deployed in open lots.
    pub fn open_cost_basis(&self) -> f64 {
        self.lots.iter().map(|l| l.cost_basis).sum()
    }

    /// Volume-weighted average entry price, 0.0 when flat.
    pub fn average_cost(&self) -> f64 {
        let shares = self.total_shares();
        if shares > 0.0 {
            self.open_cost_basis() / shares
        } else {
            0.0
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        price * self.total_shares()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.market_value(price) - self.open_cost_basis()
    }
}
