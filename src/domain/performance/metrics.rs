//! Per-run performance metrics.
//!
//! All metric math runs on the daily equity curve in full double
//! precision; percent scaling happens here exactly once, display rounding
//! only in the reporter.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate metrics of one simulation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub final_value: f64,
    pub total_return_percent: f64,
    pub cagr: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    /// Annualized standard deviation of daily returns, in percent.
    pub volatility: f64,
    /// Fraction of sells that realized a positive PnL.
    pub win_rate: f64,
    /// mean(daily deployed) / max(daily deployed).
    pub capital_efficiency: f64,
}

/// The buy-and-hold baseline: the same initial capital bought at the
/// first close and held to the last.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyAndHoldMetrics {
    pub final_value: f64,
    pub total_return_percent: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
}

/// Computes run metrics from an anchored daily equity curve, the daily
/// deployed-capital series and the realized PnL of each sell.
pub fn compute_run_metrics(
    initial_capital: f64,
    equity_curve: &[f64],
    deployed: &[f64],
    sell_pnls: &[f64],
) -> RunMetrics {
    let final_value = equity_curve.last().copied().unwrap_or(initial_capital);
    let total_return_percent = if initial_capital > 0.0 {
        (final_value - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    };

    let returns = daily_returns(equity_curve);
    let wins = sell_pnls.iter().filter(|&&p| p > 0.0).count();
    let win_rate = if sell_pnls.is_empty() {
        0.0
    } else {
        wins as f64 / sell_pnls.len() as f64
    };

    let max_deployed = deployed.iter().copied().fold(0.0_f64, f64::max);
    let capital_efficiency = if max_deployed > 0.0 {
        deployed.iter().sum::<f64>() / deployed.len() as f64 / max_deployed
    } else {
        0.0
    };

    RunMetrics {
        final_value,
        total_return_percent,
        cagr: cagr_percent(initial_capital, final_value, equity_curve.len()),
        max_drawdown_percent: max_drawdown_percent(equity_curve),
        sharpe_ratio: sharpe_ratio(&returns),
        volatility: annualized_volatility_percent(&returns),
        win_rate,
        capital_efficiency,
    }
}

/// Computes the buy-and-hold baseline over the same close series.
pub fn buy_and_hold(initial_capital: f64, closes: &[f64]) -> BuyAndHoldMetrics {
    let Some(&first) = closes.first() else {
        return BuyAndHoldMetrics::default();
    };
    if first <= 0.0 || initial_capital <= 0.0 {
        return BuyAndHoldMetrics::default();
    }

    let shares = initial_capital / first;
    let curve: Vec<f64> = closes.iter().map(|c| shares * c).collect();
    let final_value = curve.last().copied().unwrap_or(initial_capital);
    let returns = daily_returns(&curve);

    BuyAndHoldMetrics {
        final_value,
        total_return_percent: (final_value - initial_capital) / initial_capital * 100.0,
        max_drawdown_percent: max_drawdown_percent(&curve),
        sharpe_ratio: sharpe_ratio(&returns),
    }
}

/// Compound annual growth rate with years measured as trading days / 252.
fn cagr_percent(initial: f64, final_value: f64, trading_days: usize) -> f64 {
    if initial <= 0.0 || trading_days < 2 {
        return 0.0;
    }
    if final_value <= 0.0 {
        return -100.0;
    }
    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    ((final_value / initial).powf(1.0 / years) - 1.0) * 100.0
}

/// Maximum peak-to-trough drawdown over the curve, as a positive percent.
fn max_drawdown_percent(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &equity in equity_curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak * 100.0);
        }
    }
    max_dd
}

fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualized Sharpe with zero risk-free rate and sample stdev; 0 when the
/// curve is flat.
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let data = Data::new(returns.to_vec());
    let (Some(mean), Some(std_dev)) = (data.mean(), data.std_dev()) else {
        return 0.0;
    };
    if std_dev > 0.0 {
        mean * TRADING_DAYS_PER_YEAR / (std_dev * TRADING_DAYS_PER_YEAR.sqrt())
    } else {
        0.0
    }
}

fn annualized_volatility_percent(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let data = Data::new(returns.to_vec());
    match data.std_dev() {
        Some(std_dev) if std_dev > 0.0 => std_dev * TRADING_DAYS_PER_YEAR.sqrt() * 100.0,
        _ => 0.0,
    }
}
