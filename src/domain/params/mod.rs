pub mod beta;

use crate::domain::errors::SimulationError;
use crate::domain::trading::OrderKind;
use serde::{Deserialize, Serialize};

/// Loss tolerance applied to the lots left behind by a partial sell when
/// deriving the trailing-sell limit price.
pub const REMAINING_LOTS_LOSS_TOLERANCE: f64 = 0.05;

/// Floor for the adaptively narrowed trailing-sell pullback.
pub const ADAPTIVE_PULLBACK_FLOOR: f64 = 0.02;

/// Full parameter set for one simulation run.
///
/// All rate parameters are fractions (0.10 = 10%), normalized once at
/// entry; the engine never sees percent-scaled values. The set is
/// validated before a run starts and is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyParams {
    pub grid_interval_percent: f64,
    pub profit_requirement: f64,
    pub trailing_buy_activation_percent: f64,
    pub trailing_buy_rebound_percent: f64,
    pub trailing_sell_activation_percent: f64,
    pub trailing_sell_pullback_percent: f64,
    pub grid_consecutive_increment: f64,
    pub lot_size_usd: f64,
    pub max_lots: usize,
    pub max_lots_to_sell: usize,

    pub enable_consecutive_incremental_buy_grid: bool,
    pub enable_consecutive_incremental_sell_profit: bool,
    pub enable_beta_scaling: bool,
    pub enable_dynamic_grid: bool,
    pub normalize_to_reference: bool,
    pub enable_average_based_sell: bool,
    pub enable_adaptive_trailing_sell: bool,
    pub momentum_based_buy: bool,
    pub momentum_based_sell: bool,
    /// Whether running extrema are reset when a buy is rejected
    /// (grid spacing, momentum gate, insufficient cash, ...).
    pub reset_extrema_on_rejection: bool,

    pub trailing_stop_order_type: OrderKind,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            grid_interval_percent: 0.10,
            profit_requirement: 0.05,
            trailing_buy_activation_percent: 0.10,
            trailing_buy_rebound_percent: 0.05,
            trailing_sell_activation_percent: 0.20,
            trailing_sell_pullback_percent: 0.10,
            grid_consecutive_increment: 0.05,
            lot_size_usd: 10_000.0,
            max_lots: 10,
            max_lots_to_sell: 1,
            enable_consecutive_incremental_buy_grid: false,
            enable_consecutive_incremental_sell_profit: false,
            enable_beta_scaling: false,
            enable_dynamic_grid: false,
            normalize_to_reference: false,
            enable_average_based_sell: false,
            enable_adaptive_trailing_sell: false,
            momentum_based_buy: false,
            momentum_based_sell: false,
            reset_extrema_on_rejection: false,
            trailing_stop_order_type: OrderKind::Market,
        }
    }
}

impl StrategyParams {
    /// Validates the set per the error contract. A failed validation means
    /// the run never starts.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let non_negative = [
            ("profitRequirement", self.profit_requirement),
            ("trailingBuyActivationPercent", self.trailing_buy_activation_percent),
            ("trailingBuyReboundPercent", self.trailing_buy_rebound_percent),
            ("trailingSellActivationPercent", self.trailing_sell_activation_percent),
            ("trailingSellPullbackPercent", self.trailing_sell_pullback_percent),
            ("gridConsecutiveIncrement", self.grid_consecutive_increment),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::invalid_parameters(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        if !self.grid_interval_percent.is_finite() || self.grid_interval_percent <= 0.0 {
            return Err(SimulationError::invalid_parameters(format!(
                "gridIntervalPercent must be positive, got {}",
                self.grid_interval_percent
            )));
        }

        let trailing = [
            ("trailingBuyActivationPercent", self.trailing_buy_activation_percent),
            ("trailingBuyReboundPercent", self.trailing_buy_rebound_percent),
            ("trailingSellActivationPercent", self.trailing_sell_activation_percent),
            ("trailingSellPullbackPercent", self.trailing_sell_pullback_percent),
        ];
        for (name, value) in trailing {
            if value >= 1.0 {
                return Err(SimulationError::invalid_parameters(format!(
                    "{} must be below 1.0, got {}",
                    name, value
                )));
            }
        }

        if !self.lot_size_usd.is_finite() || self.lot_size_usd <= 0.0 {
            return Err(SimulationError::invalid_parameters(format!(
                "lotSizeUsd must be positive, got {}",
                self.lot_size_usd
            )));
        }
        if self.max_lots == 0 {
            return Err(SimulationError::invalid_parameters("maxLots must be at least 1"));
        }
        if self.max_lots_to_sell == 0 {
            return Err(SimulationError::invalid_parameters(
                "maxLotsToSell must be at least 1",
            ));
        }

        Ok(())
    }
}
