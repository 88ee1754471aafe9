//! Per-symbol simulation engine.
//!
//! Drives one bar at a time through a fixed ordered sequence of checks.
//! The order is a hard contract: running extrema advance only after all
//! same-day decisions, otherwise an activation could be triggered by the
//! very bar that caused it.

use crate::domain::errors::SimulationError;
use crate::domain::market::{self, Bar};
use crate::domain::params::{
    ADAPTIVE_PULLBACK_FLOOR, REMAINING_LOTS_LOSS_TOLERANCE, StrategyParams,
};
use crate::domain::performance::metrics::{self, BuyAndHoldMetrics};
use crate::domain::trading::trailing::{
    TrailingBuy, TrailingBuyOrder, TrailingSell, TrailingSellOrder,
};
use crate::domain::trading::transaction::GridRejection;
use crate::domain::trading::{Lot, Position, RejectReason, Transaction, TransactionKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Capital gate seen by the engine when a buy is about to fill. The
/// single-symbol mode never refuses; the portfolio mode meters a shared
/// cash pool through this seam.
pub trait CapitalGate {
    /// Attempts to reserve `amount` for a buy. Returning `false` rejects
    /// the buy (`insufficient_cash`) and leaves the trailing stop armed.
    fn try_reserve(&mut self, amount: f64) -> bool;

    /// Returns sale proceeds to the pool.
    fn deposit(&mut self, amount: f64);
}

/// Gate for single-symbol runs: lot count is the only capital limit.
pub struct UnlimitedCapital;

impl CapitalGate for UnlimitedCapital {
    fn try_reserve(&mut self, _amount: f64) -> bool {
        true
    }

    fn deposit(&mut self, _amount: f64) {}
}

/// One mid-bar check of the per-bar sequence. The first-bar extrema
/// seed, the daily record and the extrema advance always bracket these
/// seven; only the checks in between are expressible as a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarStep {
    SellActivation,
    SellUpdate,
    SellCancellation,
    SellExecution,
    BuyCancellation,
    BuyExecution,
    BuyArmOrTrail,
}

/// The contractual mid-bar ordering: sell decisions before buy
/// decisions, execution of an already-armed stop before arming or
/// trailing it. Running the checks in any other order changes ledgers;
/// the ordering regression suite proves that by swapping entries.
pub const BAR_STEP_ORDER: [BarStep; 7] = [
    BarStep::SellActivation,
    BarStep::SellUpdate,
    BarStep::SellCancellation,
    BarStep::SellExecution,
    BarStep::BuyCancellation,
    BarStep::BuyExecution,
    BarStep::BuyArmOrTrail,
];

/// One point of the daily series: close, anchored equity and deployed
/// cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub equity: f64,
    pub deployed: f64,
}

/// Stable output contract of a single-symbol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRunResult {
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return_percent: f64,
    pub cagr: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub volatility: f64,
    pub capital_efficiency: f64,
    pub total_trades: usize,
    pub final_lots: usize,
    pub lots: Vec<Lot>,
    pub enhanced_transactions: Vec<Transaction>,
    pub daily_equity: Vec<EquityPoint>,
    pub buy_and_hold: BuyAndHoldMetrics,
    pub outperformance: f64,
    pub outperformance_percent: f64,
}

#[derive(Debug, Clone)]
struct DailyRecord {
    date: NaiveDate,
    close: f64,
    /// Realized plus unrealized PnL relative to deployed capital.
    net_pnl: f64,
    deployed: f64,
}

/// Validated single-symbol simulator; one instance per run, no shared
/// state, no wall-clock dependence.
pub struct Simulator {
    params: StrategyParams,
}

impl Simulator {
    pub fn new(params: StrategyParams) -> Result<Self, SimulationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Runs the full bar loop over a pre-fetched series.
    pub fn run(&self, symbol: &str, bars: &[Bar]) -> Result<SymbolRunResult, SimulationError> {
        market::validate_series(symbol, bars)?;
        if bars.is_empty() {
            return Err(SimulationError::InsufficientData {
                symbol: symbol.to_string(),
                bars: 0,
                minimum: 1,
            });
        }

        let mut sim = SymbolSimulation::new(symbol, self.params.clone());
        let mut gate = UnlimitedCapital;
        for bar in bars {
            sim.step_bar(bar, &mut gate)?;
        }
        Ok(sim.finish())
    }
}

/// Incremental per-symbol simulation state. The portfolio simulator steps
/// this directly, one bar at a time, under its own capital gate.
pub struct SymbolSimulation {
    params: StrategyParams,
    position: Position,
    transactions: Vec<Transaction>,
    daily: Vec<DailyRecord>,
    /// First-bar close; dynamic-grid reference before any execution.
    reference_close: Option<f64>,
    bars_seen: usize,
}

impl SymbolSimulation {
    pub fn new(symbol: &str, params: StrategyParams) -> Self {
        Self {
            params,
            position: Position::new(symbol),
            transactions: Vec::new(),
            daily: Vec::new(),
            reference_close: None,
            bars_seen: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.position.symbol
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Market value of the open lots at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.position.ledger.market_value(price)
    }

    /// Advances the simulation by one bar. The step order is fixed:
    ///
    /// 1. first-bar extrema seed
    /// 2. trailing-sell activation
    /// 3. trailing-sell update
    /// 4. trailing-sell cancellation (profitability / stale lot handles)
    /// 5. trailing-sell execution
    /// 6. trailing-buy cancellation (limit orders)
    /// 7. trailing-buy execution
    /// 8. trailing-buy activation or update, with a second execution pass
    ///    when the stop armed or moved this bar
    /// 9. daily equity/deployed record
    /// 10. extrema advance
    ///
    /// Steps 2-8 are [`BAR_STEP_ORDER`]; 1, 9 and 10 always bracket them.
    pub fn step_bar(
        &mut self,
        bar: &Bar,
        gate: &mut dyn CapitalGate,
    ) -> Result<(), SimulationError> {
        self.step_bar_with_order(bar, gate, &BAR_STEP_ORDER)
    }

    /// Advances the simulation by one bar with an explicit mid-bar step
    /// sequence. Production callers go through [`Self::step_bar`] and
    /// [`BAR_STEP_ORDER`]; any other sequence changes ledgers and exists
    /// so the ordering regression suite can swap steps and observe the
    /// divergence.
    pub fn step_bar_with_order(
        &mut self,
        bar: &Bar,
        gate: &mut dyn CapitalGate,
        steps: &[BarStep],
    ) -> Result<(), SimulationError> {
        let price = bar.adj_close;
        let date = bar.date;

        if self.bars_seen == 0 {
            self.position.reset_extrema(price);
            self.reference_close = Some(price);
        }
        self.bars_seen += 1;

        let mut bought = false;
        for step in steps {
            match step {
                BarStep::SellActivation => self.try_activate_sell(date, price),
                BarStep::SellUpdate => {
                    if let TrailingSell::Armed(order) = &mut self.position.trailing_sell {
                        order.ratchet(price);
                    }
                }
                BarStep::SellCancellation => self.maybe_cancel_sell(price),
                BarStep::SellExecution => self.try_execute_sell(date, price, gate),
                BarStep::BuyCancellation => {
                    if let TrailingBuy::Armed(order) = &self.position.trailing_buy
                        && order.should_cancel(price)
                    {
                        debug!(
                            "{}: trailing buy cancelled above peak reference",
                            self.symbol()
                        );
                        self.position.trailing_buy = TrailingBuy::Idle;
                    }
                }
                BarStep::BuyExecution => {
                    if !bought {
                        bought = self.try_execute_buy(date, price, gate);
                    }
                }
                BarStep::BuyArmOrTrail => {
                    if !bought {
                        let stop_changed = match &mut self.position.trailing_buy {
                            TrailingBuy::Idle => {
                                let threshold = self.position.recent_peak
                                    * (1.0 - self.params.trailing_buy_activation_percent);
                                if price <= threshold {
                                    self.position.trailing_buy =
                                        TrailingBuy::Armed(TrailingBuyOrder::arm(
                                            price,
                                            self.position.recent_peak,
                                            self.params.trailing_buy_rebound_percent,
                                            self.params.trailing_stop_order_type,
                                        ));
                                    true
                                } else {
                                    false
                                }
                            }
                            TrailingBuy::Armed(order) => {
                                order.trail_down(price, self.params.trailing_buy_rebound_percent)
                            }
                        };
                        if stop_changed {
                            bought = self.try_execute_buy(date, price, gate);
                        }
                    }
                }
            }
        }

        self.daily.push(DailyRecord {
            date,
            close: price,
            net_pnl: self.position.realized_pnl + self.position.ledger.unrealized_pnl(price),
            deployed: self.position.ledger.open_cost_basis(),
        });

        self.position.advance_extrema(price);

        self.check_invariants()
    }

    /// Forced sale of every open lot at `price`, one synthetic row per
    /// lot. Used when a symbol leaves its index window.
    pub fn liquidate(&mut self, date: NaiveDate, price: f64, gate: &mut dyn CapitalGate) {
        let ids: Vec<u64> = self.position.ledger.iter().map(|l| l.id).collect();
        for id in ids {
            let Some(lot) = self.position.ledger.get(id).cloned() else {
                continue;
            };
            let (shares, pnl) = self.position.record_sell(price, &[id]);
            gate.deposit(price * shares);
            debug!(
                "{}: synthetic liquidation of lot entered {} @ {:.4}",
                self.symbol(),
                lot.entry_date,
                lot.entry_price
            );
            self.transactions.push(Transaction::execution(
                date,
                TransactionKind::SyntheticLiquidation,
                price,
                shares,
                Some(pnl),
                self.position.ledger.len(),
            ));
        }
        self.position.trailing_buy = TrailingBuy::Idle;
        self.position.trailing_sell = TrailingSell::Idle;
        self.daily.push(DailyRecord {
            date,
            close: price,
            net_pnl: self.position.realized_pnl,
            deployed: 0.0,
        });
    }

    /// Finalizes a single-symbol run: the metrics anchor is the peak
    /// deployed capital over the run.
    pub fn finish(self) -> SymbolRunResult {
        let anchor = self
            .daily
            .iter()
            .map(|d| d.deployed)
            .fold(0.0_f64, f64::max);
        self.finish_with_capital(anchor)
    }

    /// Finalizes with an explicit capital anchor (portfolio slices).
    pub fn finish_with_capital(self, initial_capital: f64) -> SymbolRunResult {
        let equity_curve: Vec<f64> = self.daily.iter().map(|d| initial_capital + d.net_pnl).collect();
        let deployed: Vec<f64> = self.daily.iter().map(|d| d.deployed).collect();
        let closes: Vec<f64> = self.daily.iter().map(|d| d.close).collect();
        let sell_pnls: Vec<f64> = self
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Sell)
            .filter_map(|t| t.pnl)
            .collect();

        let run = metrics::compute_run_metrics(initial_capital, &equity_curve, &deployed, &sell_pnls);
        let buy_and_hold = metrics::buy_and_hold(initial_capital, &closes);
        let total_trades = self
            .transactions
            .iter()
            .filter(|t| t.kind.is_execution())
            .count();

        let daily_equity: Vec<EquityPoint> = self
            .daily
            .iter()
            .zip(&equity_curve)
            .map(|(d, &equity)| EquityPoint {
                date: d.date,
                close: d.close,
                equity,
                deployed: d.deployed,
            })
            .collect();

        SymbolRunResult {
            symbol: self.position.symbol.clone(),
            start_date: self.daily.first().map(|d| d.date),
            end_date: self.daily.last().map(|d| d.date),
            initial_capital,
            final_value: run.final_value,
            total_return_percent: run.total_return_percent,
            cagr: run.cagr,
            max_drawdown_percent: run.max_drawdown_percent,
            sharpe_ratio: run.sharpe_ratio,
            win_rate: run.win_rate,
            volatility: run.volatility,
            capital_efficiency: run.capital_efficiency,
            total_trades,
            final_lots: self.position.ledger.len(),
            lots: self.position.lots_snapshot(),
            outperformance: run.final_value - buy_and_hold.final_value,
            outperformance_percent: run.total_return_percent - buy_and_hold.total_return_percent,
            buy_and_hold,
            enhanced_transactions: self.transactions,
            daily_equity,
        }
    }

    // ---- trailing sell ----

    fn try_activate_sell(&mut self, date: NaiveDate, price: f64) {
        if !matches!(self.position.trailing_sell, TrailingSell::Idle)
            || self.position.ledger.is_empty()
        {
            return;
        }
        let params = &self.params;
        let average_cost = self.position.ledger.average_cost();
        let consecutive = self.position.consecutive_sell_count >= 1;

        // Downtrend continuation of a sell run narrows the pullback and
        // waives the profit requirement entirely.
        let adaptive_down = params.enable_adaptive_trailing_sell
            && self.position.consecutive_sell_count >= 2
            && self.position.last_sell_price.is_some_and(|last| price < last);

        let activation = if adaptive_down {
            0.0
        } else {
            params.trailing_sell_activation_percent
        };
        let pullback = if adaptive_down {
            let k = self.position.consecutive_sell_count.saturating_sub(1);
            (params.trailing_sell_pullback_percent * 0.5_f64.powi(k as i32))
                .max(ADAPTIVE_PULLBACK_FLOOR)
        } else {
            params.trailing_sell_pullback_percent
        };

        if !adaptive_down && price <= average_cost {
            return;
        }
        if price < self.position.recent_bottom * (1.0 + activation) {
            return;
        }

        let lot_profit_requirement = if adaptive_down {
            0.0
        } else if params.enable_consecutive_incremental_sell_profit && consecutive {
            params.profit_requirement + self.effective_grid(price)
        } else {
            params.profit_requirement
        };

        let eligible = self.eligible_lots(price, lot_profit_requirement, consecutive, adaptive_down);
        if eligible.is_empty() {
            self.transactions.push(Transaction::rejection(
                date,
                TransactionKind::RejectedSell,
                price,
                0.0,
                self.position.ledger.len(),
                RejectReason::NoEligibleLots,
            ));
            return;
        }

        let lots_to_sell = if params.momentum_based_sell {
            // momentum exit unwinds the whole eligible slice
            self.position.ledger.select_lifo(&eligible, eligible.len())
        } else {
            self.position
                .ledger
                .select_lifo(&eligible, params.max_lots_to_sell)
        };

        let (basis, shares) = lots_to_sell
            .iter()
            .filter_map(|id| self.position.ledger.get(*id))
            .fold((0.0, 0.0), |(b, s), lot| (b + lot.cost_basis, s + lot.shares));
        if shares <= 0.0 {
            return;
        }
        let weighted_entry = basis / shares;

        debug!(
            "{}: trailing sell armed @ {:.4} over {} lot(s)",
            self.symbol(),
            price,
            lots_to_sell.len()
        );
        self.position.trailing_sell = TrailingSell::Armed(TrailingSellOrder {
            stop_price: price * (1.0 - pullback),
            limit_price: weighted_entry * (1.0 - REMAINING_LOTS_LOSS_TOLERANCE),
            highest_price: price,
            lots_to_sell,
            lot_profit_requirement,
            pullback_percent: pullback,
            profit_bypassed: adaptive_down,
            order_kind: params.trailing_stop_order_type,
        });
    }

    fn eligible_lots(
        &self,
        price: f64,
        lot_profit_requirement: f64,
        consecutive: bool,
        adaptive_down: bool,
    ) -> Vec<u64> {
        let ledger = &self.position.ledger;
        if adaptive_down {
            return ledger.iter().map(|l| l.id).collect();
        }
        if self.params.enable_average_based_sell {
            let reference = if consecutive {
                self.position
                    .last_sell_price
                    .unwrap_or_else(|| ledger.average_cost())
            } else {
                ledger.average_cost()
            };
            return if price > reference * (1.0 + lot_profit_requirement) {
                ledger.iter().map(|l| l.id).collect()
            } else {
                Vec::new()
            };
        }
        ledger
            .iter()
            .filter(|lot| {
                let reference = if consecutive {
                    self.position.last_sell_price.unwrap_or(lot.entry_price)
                } else {
                    lot.entry_price
                };
                price > reference * (1.0 + lot_profit_requirement)
            })
            .map(|l| l.id)
            .collect()
    }

    fn maybe_cancel_sell(&mut self, price: f64) {
        let TrailingSell::Armed(order) = &self.position.trailing_sell else {
            return;
        };
        let stale_handle = order
            .lots_to_sell
            .iter()
            .any(|id| !self.position.ledger.contains(*id));
        let no_longer_profitable =
            !order.profit_bypassed && price <= self.position.ledger.average_cost();
        if stale_handle || no_longer_profitable {
            debug!("{}: trailing sell cancelled", self.symbol());
            self.position.trailing_sell = TrailingSell::Idle;
        }
    }

    fn try_execute_sell(&mut self, date: NaiveDate, price: f64, gate: &mut dyn CapitalGate) {
        let TrailingSell::Armed(order) = &self.position.trailing_sell else {
            return;
        };
        if !order.triggered(price) {
            return;
        }

        let average_cost = self.position.ledger.average_cost();
        if !order.profit_bypassed && price <= average_cost * (1.0 + self.params.profit_requirement)
        {
            let frozen_shares: f64 = order
                .lots_to_sell
                .iter()
                .filter_map(|id| self.position.ledger.get(*id))
                .map(|l| l.shares)
                .sum();
            self.transactions.push(Transaction::rejection(
                date,
                TransactionKind::RejectedSell,
                price,
                frozen_shares,
                self.position.ledger.len(),
                RejectReason::Unprofitable,
            ));
            return;
        }

        let lot_ids = order.lots_to_sell.clone();
        let (shares, pnl) = self.position.record_sell(price, &lot_ids);
        gate.deposit(price * shares);
        debug!(
            "{}: SELL {:.4} shares @ {:.4}, pnl {:.4}",
            self.symbol(),
            shares,
            price,
            pnl
        );
        self.transactions.push(Transaction::execution(
            date,
            TransactionKind::Sell,
            price,
            shares,
            Some(pnl),
            self.position.ledger.len(),
        ));
    }

    // ---- trailing buy ----

    fn try_execute_buy(&mut self, date: NaiveDate, price: f64, gate: &mut dyn CapitalGate) -> bool {
        let TrailingBuy::Armed(order) = &self.position.trailing_buy else {
            return false;
        };
        if !order.triggered(price) {
            return false;
        }

        let params = &self.params;
        let open_lots = self.position.ledger.len();

        if !params.momentum_based_buy && open_lots >= params.max_lots {
            self.reject_buy(date, price, RejectReason::MaxLots, None);
            return false;
        }

        let required = self.effective_grid(price);
        if let Some((closest, spacing)) = self.grid_violation(price, required) {
            self.reject_buy(
                date,
                price,
                RejectReason::GridSpacing,
                Some(GridRejection {
                    required_spacing: required,
                    closest_entry_price: closest,
                    actual_spacing: spacing,
                }),
            );
            return false;
        }

        if params.momentum_based_buy
            && open_lots >= 1
            && self.position.ledger.unrealized_pnl(price) <= 0.0
        {
            self.reject_buy(date, price, RejectReason::MomentumPnlGate, None);
            return false;
        }

        if params.enable_consecutive_incremental_buy_grid
            && self.position.last_buy_price.is_some_and(|last| price >= last)
        {
            // rejects this execution instance only; the stop stays armed
            self.reject_buy(date, price, RejectReason::DescendingEntry, None);
            return false;
        }

        if !gate.try_reserve(params.lot_size_usd) {
            self.reject_buy(date, price, RejectReason::InsufficientCash, None);
            return false;
        }

        let lot_size = params.lot_size_usd;
        self.position.record_buy(date, price, lot_size);
        debug!("{}: BUY @ {:.4} ({:.4} USD)", self.symbol(), price, lot_size);
        self.transactions.push(Transaction::execution(
            date,
            TransactionKind::Buy,
            price,
            lot_size / price,
            None,
            self.position.ledger.len(),
        ));
        true
    }

    fn reject_buy(
        &mut self,
        date: NaiveDate,
        price: f64,
        reason: RejectReason,
        grid: Option<GridRejection>,
    ) {
        debug!("{}: buy rejected @ {:.4} ({})", self.symbol(), price, reason);
        let mut tx = Transaction::rejection(
            date,
            TransactionKind::RejectedBuy,
            price,
            self.params.lot_size_usd / price,
            self.position.ledger.len(),
            reason,
        );
        tx.grid = grid;
        self.transactions.push(tx);
        if self.params.reset_extrema_on_rejection {
            self.position.reset_extrema(price);
        }
    }

    /// Effective grid requirement for a buy at `price`: base grid,
    /// consecutive escalation, dynamic scaling.
    fn effective_grid(&self, price: f64) -> f64 {
        let params = &self.params;
        let mut grid = params.grid_interval_percent;
        if params.enable_consecutive_incremental_buy_grid {
            grid += self.position.consecutive_buy_count as f64 * params.grid_consecutive_increment;
        }
        if params.enable_dynamic_grid {
            let reference = if params.normalize_to_reference {
                self.reference_close
            } else {
                self.position.last_execution_price.or(self.reference_close)
            };
            if let Some(reference) = reference
                && reference > 0.0
            {
                grid *= (price / reference).sqrt();
            }
        }
        grid
    }

    /// Returns the closest violating lot `(entry_price, spacing)` when any
    /// open lot sits nearer than the required grid distance.
    fn grid_violation(&self, price: f64, required: f64) -> Option<(f64, f64)> {
        let mut closest: Option<(f64, f64)> = None;
        for lot in self.position.ledger.iter() {
            let spacing = (price - lot.entry_price).abs() / lot.entry_price;
            if spacing < required && closest.is_none_or(|(_, s)| spacing < s) {
                closest = Some((lot.entry_price, spacing));
            }
        }
        closest
    }

    fn check_invariants(&self) -> Result<(), SimulationError> {
        let last = || self.transactions.last().map(Transaction::summary);
        if self.position.consecutive_buy_count > 0 && self.position.consecutive_sell_count > 0 {
            return Err(SimulationError::InvariantViolation {
                detail: format!(
                    "{}: consecutive buy and sell counters both positive",
                    self.symbol()
                ),
                last_transaction: last(),
            });
        }
        let shares = self.position.ledger.total_shares();
        if !shares.is_finite() || shares < 0.0 {
            return Err(SimulationError::InvariantViolation {
                detail: format!("{}: total shares {} out of range", self.symbol(), shares),
                last_transaction: last(),
            });
        }
        Ok(())
    }
}
