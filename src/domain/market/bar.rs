use crate::domain::errors::SimulationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily OHLC bar. All trading decisions read `adj_close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl Bar {
    /// Fixture constructor: a flat bar where every price field is `close`.
    pub fn flat(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: 0.0,
        }
    }
}

/// Minimum trading days a resolved data window must span before a run is
/// allowed to start. The engine itself accepts shorter series; the floor
/// applies where windows are resolved (CLI, batch data loading).
pub const MIN_TRADING_DAYS: usize = 30;

/// Rejects windows shorter than [`MIN_TRADING_DAYS`].
pub fn ensure_min_history(symbol: &str, bars: &[Bar]) -> Result<(), SimulationError> {
    if bars.len() < MIN_TRADING_DAYS {
        return Err(SimulationError::InsufficientData {
            symbol: symbol.to_string(),
            bars: bars.len(),
            minimum: MIN_TRADING_DAYS,
        });
    }
    Ok(())
}

/// Checks that a series is finite, strictly date-ascending and free of
/// duplicates, and that decision prices are positive.
pub fn validate_series(symbol: &str, bars: &[Bar]) -> Result<(), SimulationError> {
    for (i, bar) in bars.iter().enumerate() {
        if !bar.adj_close.is_finite() || bar.adj_close <= 0.0 {
            return Err(SimulationError::data_unavailable(
                symbol,
                format!("non-positive adjusted close {} on {}", bar.adj_close, bar.date),
            ));
        }
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(SimulationError::data_unavailable(
                symbol,
                format!(
                    "bars out of order: {} follows {}",
                    bar.date,
                    bars[i - 1].date
                ),
            ));
        }
    }
    Ok(())
}

/// Restricts a series to `[start, end]` (inclusive calendar bounds).
/// `None` leaves the corresponding side unbounded.
pub fn window(bars: &[Bar], start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    bars.iter()
        .filter(|b| start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e))
        .cloned()
        .collect()
}
