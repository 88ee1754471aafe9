//! Portfolio-mode integration: membership windows, synthetic
//! liquidation and beta-scaled per-symbol parameters.

use chrono::NaiveDate;
use dcasim::application::portfolio::{PortfolioConfig, PortfolioSimulator};
use dcasim::domain::params::StrategyParams;
use dcasim::domain::ports::MembershipWindow;
use dcasim::domain::trading::TransactionKind;
use dcasim::infrastructure::memory::{
    InMemoryBarSource, StaticBetaSource, StaticMembershipSource,
};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn params() -> StrategyParams {
    StrategyParams {
        trailing_buy_activation_percent: 0.10,
        trailing_buy_rebound_percent: 0.0,
        trailing_sell_activation_percent: 0.10,
        trailing_sell_pullback_percent: 0.0,
        lot_size_usd: 1000.0,
        ..StrategyParams::default()
    }
}

fn config(symbols: &[&str]) -> PortfolioConfig {
    PortfolioConfig {
        total_capital: 5000.0,
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..PortfolioConfig::default()
    }
}

#[test]
fn leaving_the_index_liquidates_at_that_close() {
    let source = InMemoryBarSource::from_closes(&[(
        "OLD",
        "2024-01-02",
        &[100.0, 90.0, 92.0, 94.0, 96.0][..],
    )]);
    let mut membership = StaticMembershipSource::new();
    membership.insert(
        "OLD",
        MembershipWindow {
            add_date: None,
            remove_date: Some(date("2024-01-05")),
        },
    );

    let result = PortfolioSimulator::new(&source)
        .with_membership_source(&membership)
        .run(&config(&["OLD"]), &params(), None, None)
        .unwrap();

    let slice = &result.symbols[0];
    let liquidations: Vec<_> = slice
        .enhanced_transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::SyntheticLiquidation)
        .collect();
    assert_eq!(liquidations.len(), 1);
    assert_eq!(liquidations[0].date, date("2024-01-05"));
    assert_eq!(liquidations[0].price, 94.0);
    assert!((liquidations[0].pnl.unwrap() - (94.0 - 90.0) * (1000.0 / 90.0)).abs() < 1e-6);
    assert_eq!(slice.final_lots, 0);

    // proceeds flowed back into the pool
    let last = result.portfolio_composition_time_series.last().unwrap();
    assert!((last.cash - (4000.0 + 94.0 * 1000.0 / 90.0)).abs() < 1e-6);
    assert_eq!(last.market_values["OLD"], 0.0);
}

#[test]
fn membership_add_date_delays_trading() {
    let source = InMemoryBarSource::from_closes(&[(
        "NEW",
        "2024-01-02",
        &[100.0, 90.0, 90.0, 81.0][..],
    )]);
    let mut membership = StaticMembershipSource::new();
    membership.insert(
        "NEW",
        MembershipWindow {
            add_date: Some(date("2024-01-04")),
            remove_date: None,
        },
    );

    let result = PortfolioSimulator::new(&source)
        .with_membership_source(&membership)
        .run(&config(&["NEW"]), &params(), None, None)
        .unwrap();

    // the pre-membership dip to 90 never traded; the simulation starts
    // on Jan 4 at 90 and buys the 10% dip to 81
    let slice = &result.symbols[0];
    let buys: Vec<_> = slice
        .enhanced_transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Buy)
        .collect();
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].date, date("2024-01-05"));
    assert_eq!(buys[0].price, 81.0);
}

#[test]
fn beta_scaling_widens_activation_per_symbol() {
    // identical price action; SCALED carries beta 2 so its activation
    // doubles to 10% and the 7% dip no longer arms a buy
    let source = InMemoryBarSource::from_closes(&[
        ("PLAIN", "2024-01-02", &[100.0, 93.0][..]),
        ("SCALED", "2024-01-02", &[100.0, 93.0][..]),
    ]);
    let mut betas = StaticBetaSource::new();
    betas.insert("SCALED", 2.0, false);

    let base = StrategyParams {
        enable_beta_scaling: true,
        trailing_buy_activation_percent: 0.05,
        ..params()
    };
    let result = PortfolioSimulator::new(&source)
        .with_beta_source(&betas)
        .run(&config(&["PLAIN", "SCALED"]), &base, None, None)
        .unwrap();

    let plain = result.symbols.iter().find(|s| s.symbol == "PLAIN").unwrap();
    let scaled = result.symbols.iter().find(|s| s.symbol == "SCALED").unwrap();
    assert_eq!(plain.final_lots, 1);
    assert_eq!(scaled.final_lots, 0);
}
