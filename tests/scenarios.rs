//! End-to-end scenario suite. Each test drives the public API with a
//! literal bar fixture and asserts the documented ledger and outcome.

use chrono::NaiveDate;
use dcasim::application::portfolio::{PortfolioConfig, PortfolioSimulator};
use dcasim::application::simulator::{Simulator, SymbolRunResult};
use dcasim::domain::market::Bar;
use dcasim::domain::params::StrategyParams;
use dcasim::domain::trading::{OrderKind, RejectReason, Transaction, TransactionKind};
use dcasim::infrastructure::memory::InMemoryBarSource;
use pretty_assertions::assert_eq;

fn bars(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar::flat(start + chrono::Days::new(i as u64), close))
        .collect()
}

fn base_params() -> StrategyParams {
    StrategyParams {
        grid_interval_percent: 0.10,
        profit_requirement: 0.05,
        trailing_buy_activation_percent: 0.10,
        trailing_buy_rebound_percent: 0.0,
        trailing_sell_activation_percent: 0.10,
        trailing_sell_pullback_percent: 0.0,
        lot_size_usd: 1000.0,
        max_lots: 10,
        trailing_stop_order_type: OrderKind::Market,
        ..StrategyParams::default()
    }
}

fn run(params: StrategyParams, closes: &[f64]) -> SymbolRunResult {
    Simulator::new(params)
        .unwrap()
        .run("TEST", &bars(closes))
        .unwrap()
}

fn executed(result: &SymbolRunResult, kind: TransactionKind) -> Vec<&Transaction> {
    result
        .enhanced_transactions
        .iter()
        .filter(|t| t.kind == kind)
        .collect()
}

/// Single buy then single sell, no trailing features.
#[test]
fn single_buy_then_single_sell() {
    let result = run(base_params(), &[100.0, 90.0, 110.0]);

    let buys = executed(&result, TransactionKind::Buy);
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].price, 90.0);
    assert!((buys[0].shares - 11.1111).abs() < 1e-3);

    let sells = executed(&result, TransactionKind::Sell);
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, 110.0);
    assert!((sells[0].pnl.unwrap() - 222.22).abs() < 0.01);

    assert!((result.final_value - 1222.22).abs() < 0.01);
    assert_eq!(result.final_lots, 0);
    assert_eq!(result.win_rate, 1.0);
}

/// A second buy too close to the first lot is rejected by the grid.
#[test]
fn grid_spacing_rejection() {
    let params = StrategyParams {
        // shallow activation so the 5% dip to 95 arms and fills
        trailing_buy_activation_percent: 0.03,
        ..base_params()
    };
    let result = run(params, &[100.0, 95.0, 92.0]);

    let buys = executed(&result, TransactionKind::Buy);
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].price, 95.0);

    let rejected = executed(&result, TransactionKind::RejectedBuy);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].price, 92.0);
    assert_eq!(rejected[0].reason, Some(RejectReason::GridSpacing));

    let grid = rejected[0].grid.as_ref().unwrap();
    assert_eq!(grid.closest_entry_price, 95.0);
    assert!((grid.actual_spacing - 0.0316).abs() < 1e-3);
    assert!((grid.required_spacing - 0.10).abs() < 1e-12);

    assert_eq!(result.final_lots, 1);
}

/// LIFO selection with maxLotsToSell = 1: the most expensive eligible lot
/// goes first.
#[test]
fn lifo_selection_sells_most_expensive_lot() {
    let params = StrategyParams {
        profit_requirement: 0.03,
        ..base_params()
    };
    // the slide from 112 builds the two-lot book at 100 and 80
    let result = run(params, &[112.0, 100.0, 80.0, 105.0]);

    let buys = executed(&result, TransactionKind::Buy);
    assert_eq!(buys.len(), 2);
    assert_eq!(buys[0].price, 100.0);
    assert_eq!(buys[1].price, 80.0);

    let sells = executed(&result, TransactionKind::Sell);
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, 105.0);
    // the 100 lot: 10 shares, 5 per share
    assert!((sells[0].shares - 10.0).abs() < 1e-9);
    assert!((sells[0].pnl.unwrap() - 50.0).abs() < 1e-9);

    // the 80 lot is still open
    assert_eq!(result.final_lots, 1);
    assert_eq!(result.lots[0].entry_price, 80.0);
}

/// Consecutive incremental buy grid: the requirement escalates with each
/// buy in the run.
#[test]
fn consecutive_incremental_buy_grid() {
    let params = StrategyParams {
        enable_consecutive_incremental_buy_grid: true,
        grid_consecutive_increment: 0.05,
        ..base_params()
    };
    let result = run(params, &[100.0, 90.0, 81.0, 76.0]);

    let buys = executed(&result, TransactionKind::Buy);
    assert_eq!(buys.len(), 2);
    assert_eq!(buys[0].price, 90.0);
    assert_eq!(buys[1].price, 76.0);

    let rejected = executed(&result, TransactionKind::RejectedBuy);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].price, 81.0);
    assert_eq!(rejected[0].reason, Some(RejectReason::GridSpacing));
    let grid = rejected[0].grid.as_ref().unwrap();
    // one buy on the books raises the requirement to 15%
    assert!((grid.required_spacing - 0.15).abs() < 1e-12);
    assert!((grid.actual_spacing - 0.10).abs() < 1e-12);
}

/// Momentum gate: an underwater position blocks further buys.
#[test]
fn momentum_pnl_gate_blocks_buy() {
    let params = StrategyParams {
        momentum_based_buy: true,
        trailing_buy_activation_percent: 0.0,
        grid_interval_percent: 0.05,
        ..base_params()
    };
    let result = run(params, &[100.0, 90.0]);

    let buys = executed(&result, TransactionKind::Buy);
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].price, 100.0);

    let rejected = executed(&result, TransactionKind::RejectedBuy);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].price, 90.0);
    assert_eq!(rejected[0].reason, Some(RejectReason::MomentumPnlGate));
    assert_eq!(result.final_lots, 1);
}

/// Portfolio cash exhaustion: the first symbol in the processing order
/// drains the pool; the second is rejected but keeps its stop armed and
/// fills once a sell releases cash.
#[test]
fn portfolio_cash_exhaustion() {
    let source = InMemoryBarSource::from_closes(&[
        ("A", "2024-01-02", &[100.0, 90.0, 100.0, 100.0][..]),
        ("B", "2024-01-02", &[50.0, 45.0, 45.0, 45.0][..]),
    ]);
    let config = PortfolioConfig {
        total_capital: 1500.0,
        margin_percent: 0.0,
        symbols: vec!["A".to_string(), "B".to_string()],
        ..PortfolioConfig::default()
    };
    let result = PortfolioSimulator::new(&source)
        .run(&config, &base_params(), None, None)
        .unwrap();

    // day 2: A's buy fills first and leaves 500 in the pool, so B's
    // simultaneous buy is rejected with the capital state on record
    assert_eq!(result.rejected_orders.len(), 1);
    let rejected = &result.rejected_orders[0];
    assert_eq!(rejected.symbol, "B");
    assert_eq!(rejected.reason, RejectReason::InsufficientCash);
    assert_eq!(rejected.date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    assert!((rejected.cash_available - 500.0).abs() < 1e-9);

    // day 3: A sells at 100, the pool refills, and B's still-armed stop
    // finally fills at 45
    let b = result.symbols.iter().find(|s| s.symbol == "B").unwrap();
    let b_buys = executed(b, TransactionKind::Buy);
    assert_eq!(b_buys.len(), 1);
    assert_eq!(b_buys[0].price, 45.0);
    assert_eq!(b_buys[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());

    // portfolio cash never went negative (the run would have aborted)
    assert!(result
        .portfolio_composition_time_series
        .iter()
        .all(|c| c.cash >= 0.0));
}
