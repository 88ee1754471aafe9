//! Batch parameter sweep.
//!
//! Enumerates the Cartesian product of parameter ranges and runs the
//! per-symbol simulator for every combination. Combinations are pure
//! functions of their inputs, so the sweep fans out on rayon; everything
//! below the batch level stays single-threaded.

use crate::application::simulator::{Simulator, SymbolRunResult};
use crate::domain::market::Bar;
use crate::domain::params::StrategyParams;
use crate::domain::trading::OrderKind;
use crossbeam_channel::Sender;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

/// Value ranges for the sweep. Scalars are swept, flags are fixed for the
/// whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterRanges {
    pub grid_interval_percent: Vec<f64>,
    pub profit_requirement: Vec<f64>,
    pub trailing_buy_activation_percent: Vec<f64>,
    pub trailing_buy_rebound_percent: Vec<f64>,
    pub trailing_sell_activation_percent: Vec<f64>,
    pub trailing_sell_pullback_percent: Vec<f64>,
    pub grid_consecutive_increment: Vec<f64>,
    pub lot_size_usd: Vec<f64>,
    pub max_lots: Vec<usize>,
    pub max_lots_to_sell: Vec<usize>,

    pub enable_consecutive_incremental_buy_grid: bool,
    pub enable_consecutive_incremental_sell_profit: bool,
    pub enable_dynamic_grid: bool,
    pub normalize_to_reference: bool,
    pub enable_average_based_sell: bool,
    pub enable_adaptive_trailing_sell: bool,
    pub momentum_based_buy: bool,
    pub momentum_based_sell: bool,
    pub trailing_stop_order_type: OrderKind,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        let base = StrategyParams::default();
        Self {
            grid_interval_percent: vec![base.grid_interval_percent],
            profit_requirement: vec![base.profit_requirement],
            trailing_buy_activation_percent: vec![base.trailing_buy_activation_percent],
            trailing_buy_rebound_percent: vec![base.trailing_buy_rebound_percent],
            trailing_sell_activation_percent: vec![base.trailing_sell_activation_percent],
            trailing_sell_pullback_percent: vec![base.trailing_sell_pullback_percent],
            grid_consecutive_increment: vec![base.grid_consecutive_increment],
            lot_size_usd: vec![base.lot_size_usd],
            max_lots: vec![base.max_lots],
            max_lots_to_sell: vec![base.max_lots_to_sell],
            enable_consecutive_incremental_buy_grid: base.enable_consecutive_incremental_buy_grid,
            enable_consecutive_incremental_sell_profit: base
                .enable_consecutive_incremental_sell_profit,
            enable_dynamic_grid: base.enable_dynamic_grid,
            normalize_to_reference: base.normalize_to_reference,
            enable_average_based_sell: base.enable_average_based_sell,
            enable_adaptive_trailing_sell: base.enable_adaptive_trailing_sell,
            momentum_based_buy: base.momentum_based_buy,
            momentum_based_sell: base.momentum_based_sell,
            trailing_stop_order_type: base.trailing_stop_order_type,
        }
    }
}

impl ParameterRanges {
    /// Materializes the Cartesian product of all scalar ranges.
    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut combinations = Vec::with_capacity(self.combination_count());

        for &grid in &self.grid_interval_percent {
            for &profit in &self.profit_requirement {
                for &buy_activation in &self.trailing_buy_activation_percent {
                    for &buy_rebound in &self.trailing_buy_rebound_percent {
                        for &sell_activation in &self.trailing_sell_activation_percent {
                            for &sell_pullback in &self.trailing_sell_pullback_percent {
                                for &increment in &self.grid_consecutive_increment {
                                    for &lot_size in &self.lot_size_usd {
                                        for &max_lots in &self.max_lots {
                                            for &max_lots_to_sell in &self.max_lots_to_sell {
                                                combinations.push(StrategyParams {
                                                    grid_interval_percent: grid,
                                                    profit_requirement: profit,
                                                    trailing_buy_activation_percent: buy_activation,
                                                    trailing_buy_rebound_percent: buy_rebound,
                                                    trailing_sell_activation_percent:
                                                        sell_activation,
                                                    trailing_sell_pullback_percent: sell_pullback,
                                                    grid_consecutive_increment: increment,
                                                    lot_size_usd: lot_size,
                                                    max_lots,
                                                    max_lots_to_sell,
                                                    enable_consecutive_incremental_buy_grid: self
                                                        .enable_consecutive_incremental_buy_grid,
                                                    enable_consecutive_incremental_sell_profit:
                                                        self.enable_consecutive_incremental_sell_profit,
                                                    enable_beta_scaling: false,
                                                    enable_dynamic_grid: self.enable_dynamic_grid,
                                                    normalize_to_reference: self
                                                        .normalize_to_reference,
                                                    enable_average_based_sell: self
                                                        .enable_average_based_sell,
                                                    enable_adaptive_trailing_sell: self
                                                        .enable_adaptive_trailing_sell,
                                                    momentum_based_buy: self.momentum_based_buy,
                                                    momentum_based_sell: self.momentum_based_sell,
                                                    reset_extrema_on_rejection: false,
                                                    trailing_stop_order_type: self
                                                        .trailing_stop_order_type,
                                                });
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        combinations
    }

    pub fn combination_count(&self) -> usize {
        self.grid_interval_percent.len()
            * self.profit_requirement.len()
            * self.trailing_buy_activation_percent.len()
            * self.trailing_buy_rebound_percent.len()
            * self.trailing_sell_activation_percent.len()
            * self.trailing_sell_pullback_percent.len()
            * self.grid_consecutive_increment.len()
            * self.lot_size_usd.len()
            * self.max_lots.len()
            * self.max_lots_to_sell.len()
    }
}

/// Metric a batch is ranked by. Drawdown ranks ascending, everything else
/// descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RankMetric {
    #[default]
    TotalReturnPercent,
    Cagr,
    SharpeRatio,
    WinRate,
    MaxDrawdownPercent,
}

impl RankMetric {
    pub const ALL: [RankMetric; 5] = [
        RankMetric::TotalReturnPercent,
        RankMetric::Cagr,
        RankMetric::SharpeRatio,
        RankMetric::WinRate,
        RankMetric::MaxDrawdownPercent,
    ];

    pub fn value(&self, result: &SymbolRunResult) -> f64 {
        match self {
            RankMetric::TotalReturnPercent => result.total_return_percent,
            RankMetric::Cagr => result.cagr,
            RankMetric::SharpeRatio => result.sharpe_ratio,
            RankMetric::WinRate => result.win_rate,
            RankMetric::MaxDrawdownPercent => result.max_drawdown_percent,
        }
    }

    /// Sort key where larger is always better.
    fn sort_key(&self, result: &SymbolRunResult) -> f64 {
        match self {
            RankMetric::MaxDrawdownPercent => -result.max_drawdown_percent,
            _ => self.value(result),
        }
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "totalreturn" | "totalreturnpercent" | "return" => Ok(RankMetric::TotalReturnPercent),
            "cagr" => Ok(RankMetric::Cagr),
            "sharpe" | "sharperatio" => Ok(RankMetric::SharpeRatio),
            "winrate" => Ok(RankMetric::WinRate),
            "drawdown" | "maxdrawdown" | "maxdrawdownpercent" => Ok(RankMetric::MaxDrawdownPercent),
            other => Err(format!("unknown rank metric: {}", other)),
        }
    }
}

/// `(completed, total)` emitted at least once per finished combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// One ranked sweep entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub symbol: String,
    pub params: StrategyParams,
    pub result: SymbolRunResult,
}

/// A combination that failed; recorded and omitted from ranking, the
/// batch itself continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCombination {
    pub symbol: String,
    pub params: StrategyParams,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestByMetric {
    pub metric: RankMetric,
    pub symbol: String,
    pub value: f64,
    pub params: StrategyParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub combinations: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub best_by_metric: Vec<BestByMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub top: Vec<BatchEntry>,
    pub all: Vec<BatchEntry>,
    pub failures: Vec<FailedCombination>,
    pub summary: BatchSummary,
}

/// Sweep runner. Holds the ranges and the ranking policy; all run state
/// is per-call.
pub struct BatchRunner {
    ranges: ParameterRanges,
    rank_metric: RankMetric,
    top_n: usize,
}

impl BatchRunner {
    pub fn new(ranges: ParameterRanges) -> Self {
        Self {
            ranges,
            rank_metric: RankMetric::default(),
            top_n: 10,
        }
    }

    pub fn with_rank_metric(mut self, metric: RankMetric) -> Self {
        self.rank_metric = metric;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Runs every (symbol, combination) pair against pre-fetched bars.
    ///
    /// Progress messages are fire-and-forget: an absent or slow consumer
    /// can never block the sweep. The cancel token is honored between
    /// combinations; in-flight runs complete.
    pub fn run(
        &self,
        bars_by_symbol: &BTreeMap<String, Vec<Bar>>,
        progress: Option<&Sender<BatchProgress>>,
        cancel: Option<&AtomicBool>,
    ) -> BatchReport {
        let combinations = self.ranges.combinations();
        let jobs: Vec<(&String, &StrategyParams)> = bars_by_symbol
            .keys()
            .flat_map(|symbol| combinations.iter().map(move |params| (symbol, params)))
            .collect();
        let total = jobs.len();
        let completed = AtomicUsize::new(0);

        info!(
            "batch: {} combinations x {} symbols = {} runs",
            combinations.len(),
            bars_by_symbol.len(),
            total
        );

        let outcomes: Vec<Option<(String, StrategyParams, Result<SymbolRunResult, String>)>> = jobs
            .into_par_iter()
            .map(|(symbol, params)| {
                if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                    return None;
                }
                let bars = &bars_by_symbol[symbol];
                let result = Simulator::new(params.clone())
                    .and_then(|simulator| simulator.run(symbol, bars))
                    .map_err(|e| e.to_string());

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(tx) = progress {
                    tx.send(BatchProgress {
                        completed: done,
                        total,
                    })
                    .ok();
                }
                Some((symbol.clone(), params.clone(), result))
            })
            .collect();

        let mut all = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0;
        for outcome in outcomes {
            match outcome {
                None => skipped += 1,
                Some((symbol, params, Ok(result))) => all.push(BatchEntry {
                    symbol,
                    params,
                    result,
                }),
                Some((symbol, params, Err(error))) => failures.push(FailedCombination {
                    symbol,
                    params,
                    error,
                }),
            }
        }

        all.sort_by(|a, b| {
            self.rank_metric
                .sort_key(&b.result)
                .partial_cmp(&self.rank_metric.sort_key(&a.result))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best_by_metric = RankMetric::ALL
            .iter()
            .filter_map(|metric| {
                all.iter()
                    .max_by(|a, b| {
                        metric
                            .sort_key(&a.result)
                            .partial_cmp(&metric.sort_key(&b.result))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|entry| BestByMetric {
                        metric: *metric,
                        symbol: entry.symbol.clone(),
                        value: metric.value(&entry.result),
                        params: entry.params.clone(),
                    })
            })
            .collect();

        let summary = BatchSummary {
            combinations: total,
            completed: all.len() + failures.len(),
            failed: failures.len(),
            skipped,
            best_by_metric,
        };

        BatchReport {
            top: all.iter().take(self.top_n).cloned().collect(),
            all,
            failures,
            summary,
        }
    }
}
