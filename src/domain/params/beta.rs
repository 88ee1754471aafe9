//! Beta-scaled parameter derivation.
//!
//! A symbol's beta, multiplied by a caller-supplied coefficient, yields a
//! single `beta_factor` applied to the six rate parameters. High-beta
//! symbols therefore trade wider grids and wider trailing bands, low-beta
//! symbols tighter ones.

use crate::domain::params::StrategyParams;
use tracing::warn;

/// Scaled rates are kept strictly below 1.0; the factor itself is never
/// clamped (callers may pre-clamp beta).
const RATE_CEILING: f64 = 1.0 - 1e-9;

/// A beta reading for one symbol, as supplied by a `BetaSource`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaReading {
    pub beta: f64,
    pub is_manual_override: bool,
}

/// Derives the per-symbol parameter set from the base set and an optional
/// beta reading. Returns the base set unchanged when scaling is disabled
/// or no beta is available. Out-of-band inputs warn but never fail.
pub fn scale_for_beta(
    symbol: &str,
    base: &StrategyParams,
    beta: Option<BetaReading>,
    coefficient: f64,
) -> StrategyParams {
    if !base.enable_beta_scaling {
        return base.clone();
    }
    let Some(reading) = beta else {
        warn!("{}: beta unavailable, beta scaling disabled for this run", symbol);
        return base.clone();
    };

    if !(0.1..=5.0).contains(&reading.beta) {
        warn!(
            "{}: beta {} outside the plausible range [0.1, 5]",
            symbol, reading.beta
        );
    }

    let factor = reading.beta * coefficient;
    let mut scaled = base.clone();
    scaled.profit_requirement = scale_rate(symbol, "profitRequirement", base.profit_requirement, factor);
    scaled.grid_interval_percent =
        scale_rate(symbol, "gridIntervalPercent", base.grid_interval_percent, factor);
    scaled.trailing_buy_activation_percent = scale_rate(
        symbol,
        "trailingBuyActivationPercent",
        base.trailing_buy_activation_percent,
        factor,
    );
    scaled.trailing_buy_rebound_percent = scale_rate(
        symbol,
        "trailingBuyReboundPercent",
        base.trailing_buy_rebound_percent,
        factor,
    );
    scaled.trailing_sell_activation_percent = scale_rate(
        symbol,
        "trailingSellActivationPercent",
        base.trailing_sell_activation_percent,
        factor,
    );
    scaled.trailing_sell_pullback_percent = scale_rate(
        symbol,
        "trailingSellPullbackPercent",
        base.trailing_sell_pullback_percent,
        factor,
    );
    scaled
}

fn scale_rate(symbol: &str, name: &str, value: f64, factor: f64) -> f64 {
    if value < 0.0 {
        warn!("{}: negative base rate {} = {}", symbol, name, value);
    }
    let scaled = (value * factor).clamp(0.0, RATE_CEILING);
    if scaled >= 0.5 {
        warn!(
            "{}: scaled {} = {:.4} is unusually large (factor {:.4})",
            symbol, name, scaled, factor
        );
    }
    scaled
}
