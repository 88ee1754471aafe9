//! Multi-symbol portfolio simulation over a shared capital pool.
//!
//! Symbols are processed in the configured order, stable across bars; the
//! only shared state is the cash pool, mutated non-concurrently within a
//! bar. Buys are gated by available cash, sells always execute.

use crate::application::simulator::{CapitalGate, SymbolRunResult, SymbolSimulation};
use crate::domain::errors::SimulationError;
use crate::domain::market::Bar;
use crate::domain::params::beta::scale_for_beta;
use crate::domain::params::StrategyParams;
use crate::domain::performance::metrics::{self, RunMetrics};
use crate::domain::ports::{BarSource, BetaSource, MembershipSource, MembershipWindow};
use crate::domain::trading::{RejectReason, TransactionKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Portfolio-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortfolioConfig {
    pub total_capital: f64,
    /// Extra buying power as a percent of capital, 0..=100.
    pub margin_percent: f64,
    /// Symbol processing order; deterministic and stable across bars.
    pub symbols: Vec<String>,
    /// Coefficient `c` in `beta_factor = beta * c`.
    pub beta_coefficient: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            total_capital: 100_000.0,
            margin_percent: 0.0,
            symbols: Vec::new(),
            beta_coefficient: 1.0,
        }
    }
}

impl PortfolioConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.total_capital.is_finite() || self.total_capital <= 0.0 {
            return Err(SimulationError::invalid_parameters(format!(
                "totalCapital must be positive, got {}",
                self.total_capital
            )));
        }
        if !(0.0..=100.0).contains(&self.margin_percent) {
            return Err(SimulationError::invalid_parameters(format!(
                "marginPercent must be within [0, 100], got {}",
                self.margin_percent
            )));
        }
        if self.symbols.is_empty() {
            return Err(SimulationError::invalid_parameters(
                "portfolio needs at least one symbol",
            ));
        }
        if !self.beta_coefficient.is_finite() || self.beta_coefficient <= 0.0 {
            return Err(SimulationError::invalid_parameters(format!(
                "betaCoefficient must be positive, got {}",
                self.beta_coefficient
            )));
        }
        Ok(())
    }

    /// Buying-power ceiling: `totalCapital * (1 + margin/100)`.
    pub fn capital_ceiling(&self) -> f64 {
        self.total_capital * (1.0 + self.margin_percent / 100.0)
    }
}

/// A buy the shared pool refused, with the capital state at that moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedOrder {
    pub date: NaiveDate,
    pub symbol: String,
    pub reason: RejectReason,
    pub cash_available: f64,
    pub deployed: f64,
}

/// Daily snapshot of the pool: cash, per-symbol market values, equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionPoint {
    pub date: NaiveDate,
    pub cash: f64,
    /// Per-symbol market values, flattened into the snapshot object.
    #[serde(flatten)]
    pub market_values: BTreeMap<String, f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRunResult {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_capital: f64,
    pub margin_percent: f64,
    pub portfolio_summary: RunMetrics,
    pub portfolio_composition_time_series: Vec<CompositionPoint>,
    pub rejected_orders: Vec<RejectedOrder>,
    pub symbols: Vec<SymbolRunResult>,
}

/// The shared pool behind the per-symbol capital gate. `deployed` is
/// refreshed from the ledgers before every step so the margin ceiling
/// tracks open cost basis, not cumulative reservations.
struct SharedCash {
    cash: f64,
    deployed: f64,
    ceiling: f64,
}

impl CapitalGate for SharedCash {
    fn try_reserve(&mut self, amount: f64) -> bool {
        if self.cash >= amount && self.deployed + amount <= self.ceiling + 1e-9 {
            self.cash -= amount;
            self.deployed += amount;
            true
        } else {
            false
        }
    }

    fn deposit(&mut self, amount: f64) {
        self.cash += amount;
    }
}

struct SymbolLane {
    simulation: SymbolSimulation,
    bars: Vec<Bar>,
    cursor: usize,
    window: MembershipWindow,
    last_close: Option<f64>,
    liquidated: bool,
}

/// Runs the portfolio simulation across all configured symbols.
pub struct PortfolioSimulator<'a> {
    bar_source: &'a dyn BarSource,
    beta_source: Option<&'a dyn BetaSource>,
    membership_source: Option<&'a dyn MembershipSource>,
}

impl<'a> PortfolioSimulator<'a> {
    pub fn new(bar_source: &'a dyn BarSource) -> Self {
        Self {
            bar_source,
            beta_source: None,
            membership_source: None,
        }
    }

    pub fn with_beta_source(mut self, source: &'a dyn BetaSource) -> Self {
        self.beta_source = Some(source);
        self
    }

    pub fn with_membership_source(mut self, source: &'a dyn MembershipSource) -> Self {
        self.membership_source = Some(source);
        self
    }

    pub fn run(
        &self,
        config: &PortfolioConfig,
        base_params: &StrategyParams,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PortfolioRunResult, SimulationError> {
        config.validate()?;
        base_params.validate()?;

        let mut lanes: Vec<SymbolLane> = Vec::with_capacity(config.symbols.len());
        let mut calendar: BTreeSet<NaiveDate> = BTreeSet::new();
        for symbol in &config.symbols {
            let bars = self.bar_source.bars(symbol, start, end)?;
            if bars.is_empty() {
                return Err(SimulationError::data_unavailable(
                    symbol,
                    "no bars in the requested window",
                ));
            }
            let beta = self.beta_source.and_then(|s| s.beta(symbol));
            let params = scale_for_beta(symbol, base_params, beta, config.beta_coefficient);
            params.validate()?;
            let window = self
                .membership_source
                .map(|s| s.membership(symbol))
                .unwrap_or_default();
            calendar.extend(bars.iter().map(|b| b.date));
            lanes.push(SymbolLane {
                simulation: SymbolSimulation::new(symbol, params),
                bars,
                cursor: 0,
                window,
                last_close: None,
                liquidated: false,
            });
        }

        let mut pool = SharedCash {
            cash: config.capital_ceiling(),
            deployed: 0.0,
            ceiling: config.capital_ceiling(),
        };
        let margin_loan = config.capital_ceiling() - config.total_capital;

        let mut composition: Vec<CompositionPoint> = Vec::with_capacity(calendar.len());
        let mut deployed_series: Vec<f64> = Vec::with_capacity(calendar.len());
        let mut rejected_orders: Vec<RejectedOrder> = Vec::new();

        info!(
            "portfolio: {} symbols, {} trading days, capital {:.2} (+{}% margin)",
            lanes.len(),
            calendar.len(),
            config.total_capital,
            config.margin_percent
        );

        for &date in &calendar {
            for idx in 0..lanes.len() {
                let (active, bar) = {
                    let lane = &lanes[idx];
                    match lane.bars.get(lane.cursor) {
                        Some(bar) if bar.date == date => {
                            (lane.window.contains(date), bar.clone())
                        }
                        _ => continue,
                    }
                };
                {
                    let lane = &mut lanes[idx];
                    lane.cursor += 1;
                    lane.last_close = Some(bar.adj_close);
                }

                if active {
                    // total open basis across every lane, so the margin
                    // ceiling tracks the whole pool
                    pool.deployed = total_deployed(&lanes);
                    let (symbol, new_rejections) = {
                        let lane = &mut lanes[idx];
                        let seen = lane.simulation.transactions().len();
                        lane.simulation.step_bar(&bar, &mut pool)?;
                        let rejections: Vec<RejectReason> = lane.simulation.transactions()[seen..]
                            .iter()
                            .filter_map(|t| t.reason)
                            .collect();
                        (lane.simulation.symbol().to_string(), rejections)
                    };
                    let deployed_now = total_deployed(&lanes);
                    for reason in new_rejections {
                        rejected_orders.push(RejectedOrder {
                            date,
                            symbol: symbol.clone(),
                            reason,
                            cash_available: pool.cash,
                            deployed: deployed_now,
                        });
                    }
                } else {
                    let lane = &mut lanes[idx];
                    if !lane.liquidated
                        && lane.window.remove_date.is_some_and(|r| date >= r)
                        && !lane.simulation.position().ledger.is_empty()
                    {
                        debug!(
                            "{}: left the index on {}, liquidating",
                            lane.simulation.symbol(),
                            date
                        );
                        lane.simulation.liquidate(date, bar.adj_close, &mut pool);
                        lane.liquidated = true;
                    }
                }

                if pool.cash < 0.0 {
                    return Err(SimulationError::InvariantViolation {
                        detail: format!("portfolio cash went negative: {}", pool.cash),
                        last_transaction: None,
                    });
                }
            }

            let mut market_values = BTreeMap::new();
            let mut total_mv = 0.0;
            for lane in &lanes {
                let mv = lane
                    .last_close
                    .map(|c| lane.simulation.market_value(c))
                    .unwrap_or(0.0);
                total_mv += mv;
                market_values.insert(lane.simulation.symbol().to_string(), mv);
            }
            deployed_series.push(total_deployed(&lanes));
            composition.push(CompositionPoint {
                date,
                cash: pool.cash,
                market_values,
                total: pool.cash + total_mv - margin_loan,
            });
        }

        let equity_curve: Vec<f64> = composition.iter().map(|c| c.total).collect();
        let sell_pnls: Vec<f64> = lanes
            .iter()
            .flat_map(|lane| lane.simulation.transactions())
            .filter(|t| t.kind == TransactionKind::Sell)
            .filter_map(|t| t.pnl)
            .collect();
        let portfolio_summary = metrics::compute_run_metrics(
            config.total_capital,
            &equity_curve,
            &deployed_series,
            &sell_pnls,
        );

        let symbols: Vec<SymbolRunResult> = lanes
            .into_iter()
            .map(|lane| lane.simulation.finish())
            .collect();

        Ok(PortfolioRunResult {
            start_date: calendar.iter().next().copied(),
            end_date: calendar.iter().next_back().copied(),
            total_capital: config.total_capital,
            margin_percent: config.margin_percent,
            portfolio_summary,
            portfolio_composition_time_series: composition,
            rejected_orders,
            symbols,
        })
    }
}

fn total_deployed(lanes: &[SymbolLane]) -> f64 {
    lanes
        .iter()
        .map(|l| l.simulation.position().ledger.open_cost_basis())
        .sum()
}
