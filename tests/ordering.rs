//! Ordering-contract regression.
//!
//! The per-bar checks must run in exactly the canonical order. This
//! suite re-runs the six end-to-end scenarios under every pairwise
//! re-ordering of the seven mid-bar steps and fails if results change:
//! the canonical order must keep matching the production bar loop
//! (whose outputs are pinned literally in `tests/scenarios.rs`), the
//! swaps that cross an order-sensitive boundary must diverge from the
//! canonical ledgers, and the remaining swaps are pinned as harmless,
//! so drift in either direction fails the suite.

use chrono::NaiveDate;
use dcasim::application::simulator::{
    BAR_STEP_ORDER, BarStep, CapitalGate, SymbolSimulation,
};
use dcasim::domain::market::Bar;
use dcasim::domain::params::StrategyParams;
use dcasim::domain::trading::{OrderKind, Transaction, TransactionKind};
use pretty_assertions::assert_eq;

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

/// One scenario: per-symbol close series sharing one calendar, a
/// parameter set and a shared cash pool (unbounded for the
/// single-symbol scenarios).
struct Scenario {
    name: &'static str,
    params: StrategyParams,
    legs: Vec<(String, Vec<f64>)>,
    cash: f64,
}

/// The six canonical scenarios, with the same fixtures as
/// `tests/scenarios.rs`.
fn scenarios() -> Vec<Scenario> {
    let single = |name: &'static str, params: StrategyParams, closes: &[f64]| Scenario {
        name,
        params,
        legs: vec![("TEST".to_string(), closes.to_vec())],
        cash: f64::INFINITY,
    };
    vec![
        single("single buy then sell", base_params(), &[100.0, 90.0, 110.0]),
        single(
            "grid spacing rejection",
            StrategyParams {
                trailing_buy_activation_percent: 0.03,
                ..base_params()
            },
            &[100.0, 95.0, 92.0],
        ),
        single(
            "lifo selection",
            StrategyParams {
                profit_requirement: 0.03,
                ..base_params()
            },
            &[112.0, 100.0, 80.0, 105.0],
        ),
        single(
            "consecutive incremental grid",
            StrategyParams {
                enable_consecutive_incremental_buy_grid: true,
                grid_consecutive_increment: 0.05,
                ..base_params()
            },
            &[100.0, 90.0, 81.0, 76.0],
        ),
        single(
            "momentum gate",
            StrategyParams {
                momentum_based_buy: true,
                trailing_buy_activation_percent: 0.0,
                grid_interval_percent: 0.05,
                ..base_params()
            },
            &[100.0, 90.0],
        ),
        Scenario {
            name: "portfolio cash exhaustion",
            params: base_params(),
            legs: vec![
                ("A".to_string(), vec![100.0, 90.0, 100.0, 100.0]),
                ("B".to_string(), vec![50.0, 45.0, 45.0, 45.0]),
            ],
            cash: 1500.0,
        },
    ]
}

/// Shared cash pool for the portfolio scenario; `INFINITY` makes it a
/// no-op gate for the single-symbol ones.
struct CashPool {
    cash: f64,
}

impl CapitalGate for CashPool {
    fn try_reserve(&mut self, amount: f64) -> bool {
        if self.cash >= amount {
            self.cash -= amount;
            true
        } else {
            false
        }
    }

    fn deposit(&mut self, amount: f64) {
        self.cash += amount;
    }
}

/// Runs a scenario bar by bar under `steps` and serializes every leg's
/// transaction log.
fn transcript(scenario: &Scenario, steps: &[BarStep]) -> String {
    let mut sims: Vec<SymbolSimulation> = scenario
        .legs
        .iter()
        .map(|(symbol, _)| SymbolSimulation::new(symbol, scenario.params.clone()))
        .collect();
    let mut pool = CashPool {
        cash: scenario.cash,
    };
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let days = scenario.legs[0].1.len();

    for day in 0..days {
        let date = start + chrono::Days::new(day as u64);
        for (sim, (_, closes)) in sims.iter_mut().zip(&scenario.legs) {
            let bar = Bar::flat(date, closes[day]);
            sim.step_bar_with_order(&bar, &mut pool, steps).unwrap();
        }
    }

    let logs: Vec<&[Transaction]> = sims.iter().map(|s| s.transactions()).collect();
    serde_json::to_string(&logs).unwrap()
}

/// Same run through the production `step_bar` entry point.
fn production_transcript(scenario: &Scenario) -> String {
    let mut sims: Vec<SymbolSimulation> = scenario
        .legs
        .iter()
        .map(|(symbol, _)| SymbolSimulation::new(symbol, scenario.params.clone()))
        .collect();
    let mut pool = CashPool {
        cash: scenario.cash,
    };
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let days = scenario.legs[0].1.len();

    for day in 0..days {
        let date = start + chrono::Days::new(day as u64);
        for (sim, (_, closes)) in sims.iter_mut().zip(&scenario.legs) {
            let bar = Bar::flat(date, closes[day]);
            sim.step_bar(&bar, &mut pool).unwrap();
        }
    }

    let logs: Vec<&[Transaction]> = sims.iter().map(|s| s.transactions()).collect();
    serde_json::to_string(&logs).unwrap()
}

/// Swaps whose re-ordering changes at least one scenario ledger, as
/// `(i, j)` index pairs into [`BAR_STEP_ORDER`]. Two boundaries are
/// load-bearing:
///
/// - sell activation moved behind sell execution (a stop armed on a bar
///   no longer fills on that bar), and
/// - arm-or-trail moved ahead of the armed-stop execution check (a stop
///   rejected during arming is consulted a second time on the same bar,
///   duplicating rejection rows).
///
/// Every other swap only moves a check across state-disjoint ones and
/// commutes on all six scenarios.
const DIVERGENT_SWAPS: [(usize, usize); 9] = [
    (0, 3), // sell activation <-> sell execution
    (0, 4), // sell activation behind buy cancellation (crosses execution)
    (0, 5), // sell activation behind buy execution (crosses execution)
    (0, 6), // sell activation <-> arm-or-trail (crosses both boundaries)
    (1, 6), // arm-or-trail ahead of the armed-stop execution check
    (2, 6),
    (3, 6),
    (4, 6),
    (5, 6), // buy execution <-> arm-or-trail
];

#[test]
fn canonical_order_is_the_production_order() {
    for scenario in scenarios() {
        assert_eq!(
            transcript(&scenario, &BAR_STEP_ORDER),
            production_transcript(&scenario),
            "{}",
            scenario.name
        );
    }
}

#[test]
fn pairwise_reorders_change_scenario_results() {
    let scenarios = scenarios();
    let canonical: Vec<String> = scenarios
        .iter()
        .map(|s| transcript(s, &BAR_STEP_ORDER))
        .collect();

    for i in 0..BAR_STEP_ORDER.len() {
        for j in i + 1..BAR_STEP_ORDER.len() {
            let mut steps = BAR_STEP_ORDER;
            steps.swap(i, j);

            let changed = scenarios
                .iter()
                .zip(&canonical)
                .any(|(scenario, baseline)| transcript(scenario, &steps) != *baseline);
            let expected = DIVERGENT_SWAPS.contains(&(i, j));

            assert_eq!(
                changed,
                expected,
                "swapping {:?} and {:?} should {}change scenario results",
                BAR_STEP_ORDER[i],
                BAR_STEP_ORDER[j],
                if expected { "" } else { "not " },
            );
        }
    }
}

/// The sharpest single divergence, spelled out: with arm-or-trail run
/// before the armed-stop execution check, a buy rejected while arming
/// is consulted again on the same bar and the grid rejection doubles.
#[test]
fn arm_before_execution_duplicates_rejections() {
    let all = scenarios();
    let scenario = &all[1]; // grid spacing rejection
    let mut steps = BAR_STEP_ORDER;
    steps.swap(5, 6); // BuyExecution <-> BuyArmOrTrail

    let canonical = transcript(scenario, &BAR_STEP_ORDER);
    let swapped = transcript(scenario, &steps);
    assert_ne!(canonical, swapped);

    let count = |raw: &str| {
        let logs: Vec<Vec<Transaction>> = serde_json::from_str(raw).unwrap();
        logs[0]
            .iter()
            .filter(|t| t.kind == TransactionKind::RejectedBuy)
            .count()
    };
    assert_eq!(count(&canonical), 1);
    assert_eq!(count(&swapped), 2);
}

/// Delaying the sell activation behind the execution check loses the
/// same-bar fill entirely: the first scenario ends still holding its
/// lot, with no sell on the books.
#[test]
fn execution_before_activation_loses_the_sell() {
    let all = scenarios();
    let scenario = &all[0]; // single buy then sell
    let mut steps = BAR_STEP_ORDER;
    steps.swap(0, 3); // SellActivation <-> SellExecution

    let swapped = transcript(scenario, &steps);
    let logs: Vec<Vec<Transaction>> = serde_json::from_str(&swapped).unwrap();
    assert!(logs[0].iter().all(|t| t.kind != TransactionKind::Sell));
}
