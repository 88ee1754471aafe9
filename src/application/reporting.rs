//! Reporting utilities for simulation results.
//!
//! Provides formatted console output and JSON export capabilities.
//! Prices and percentages are rounded here for display only; the exported
//! JSON keeps full double precision.

use crate::application::batch::BatchReport;
use crate::application::portfolio::PortfolioRunResult;
use crate::application::simulator::SymbolRunResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Default)]
pub struct Reporter;

impl Reporter {
    pub fn print_run_summary(&self, result: &SymbolRunResult) {
        println!("{}", "=".repeat(80));
        println!(
            "📊 {} | {} -> {}",
            result.symbol,
            result
                .start_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result
                .end_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        println!("{}", "-".repeat(80));
        println!(
            "  Final Value:    {:>12.2}  (capital {:.2})",
            result.final_value, result.initial_capital
        );
        println!(
            "  Return:         {:>11.2}%  CAGR {:.2}%  Sharpe {:.2}  Vol {:.2}%",
            result.total_return_percent, result.cagr, result.sharpe_ratio, result.volatility
        );
        println!(
            "  Max Drawdown:   {:>11.2}%  Win Rate {:.1}%  Capital Efficiency {:.2}",
            result.max_drawdown_percent,
            result.win_rate * 100.0,
            result.capital_efficiency
        );
        println!(
            "  Trades:         {:>12}  Open Lots {}",
            result.total_trades, result.final_lots
        );
        println!(
            "  Buy & Hold:     {:>11.2}%  Outperformance {:.2} ({:.2}%)",
            result.buy_and_hold.total_return_percent,
            result.outperformance,
            result.outperformance_percent
        );
        println!("{}\n", "=".repeat(80));
    }

    pub fn print_transactions(&self, result: &SymbolRunResult) {
        println!(
            "{:<12} | {:<22} | {:>10} | {:>12} | {:>10} | {:>5} | reason",
            "date", "type", "price", "shares", "pnl", "lots"
        );
        println!("{}", "-".repeat(96));
        for tx in &result.enhanced_transactions {
            println!(
                "{:<12} | {:<22} | {:>10.2} | {:>12.4} | {:>10.2} | {:>5} | {}",
                tx.date.to_string(),
                tx.kind.to_string(),
                tx.price,
                tx.shares,
                tx.pnl.unwrap_or(0.0),
                tx.lots_after_transaction,
                tx.reason.map(|r| r.to_string()).unwrap_or_default(),
            );
        }
        println!();
    }

    pub fn print_batch_table(&self, report: &BatchReport) {
        println!("\n{}", "=".repeat(96));
        println!(
            "✅ BATCH COMPLETE - {} runs, {} failed, {} skipped - Top {}",
            report.summary.combinations,
            report.summary.failed,
            report.summary.skipped,
            report.top.len()
        );
        println!("{}", "=".repeat(96));
        println!(
            "{:<4} | {:<8} | {:>6} | {:>7} | {:>8} | {:>8} | {:>7} | {:>7} | {:>6}",
            "#", "Symbol", "Grid", "Profit", "Return%", "CAGR%", "Sharpe", "MaxDD%", "Trades"
        );
        println!("{}", "-".repeat(96));
        for (i, entry) in report.top.iter().enumerate() {
            println!(
                "{:<4} | {:<8} | {:>6.3} | {:>7.3} | {:>8.2} | {:>8.2} | {:>7.2} | {:>7.2} | {:>6}",
                i + 1,
                entry.symbol,
                entry.params.grid_interval_percent,
                entry.params.profit_requirement,
                entry.result.total_return_percent,
                entry.result.cagr,
                entry.result.sharpe_ratio,
                entry.result.max_drawdown_percent,
                entry.result.total_trades,
            );
        }
        println!("{}", "=".repeat(96));

        for best in &report.summary.best_by_metric {
            println!(
                "  best {:?}: {} = {:.4} (grid {:.3}, profit {:.3})",
                best.metric,
                best.symbol,
                best.value,
                best.params.grid_interval_percent,
                best.params.profit_requirement,
            );
        }
        println!();
    }

    pub fn print_portfolio_summary(&self, result: &PortfolioRunResult) {
        println!("{}", "=".repeat(80));
        println!(
            "💼 PORTFOLIO | {} symbols | capital {:.2} (+{}% margin)",
            result.symbols.len(),
            result.total_capital,
            result.margin_percent
        );
        println!("{}", "-".repeat(80));
        let summary = &result.portfolio_summary;
        println!(
            "  Final Value: {:.2}  Return {:.2}%  CAGR {:.2}%  Sharpe {:.2}  MaxDD {:.2}%",
            summary.final_value,
            summary.total_return_percent,
            summary.cagr,
            summary.sharpe_ratio,
            summary.max_drawdown_percent
        );
        println!("  Rejected orders: {}", result.rejected_orders.len());
        println!("{}", "-".repeat(80));
        for symbol in &result.symbols {
            println!(
                "  {:<8} return {:>8.2}%  trades {:>4}  open lots {}",
                symbol.symbol, symbol.total_return_percent, symbol.total_trades, symbol.final_lots
            );
        }
        println!("{}\n", "=".repeat(80));
    }

    /// Writes any serializable result to pretty-printed JSON.
    pub fn export_json<T: Serialize>(&self, value: &T, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(value).context("Failed to serialize results")?;
        std::fs::write(path, json)
            .context(format!("Failed to write results to {}", path.display()))?;
        Ok(())
    }
}
