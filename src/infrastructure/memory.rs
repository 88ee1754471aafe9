//! In-memory data sources for tests, fixtures and pre-fetched runs.

use crate::domain::errors::SimulationError;
use crate::domain::market::{self, Bar};
use crate::domain::params::beta::BetaReading;
use crate::domain::ports::{BarSource, BetaSource, MembershipSource, MembershipWindow};
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

/// Bar source backed by a map of pre-built series.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBarSource {
    series: BTreeMap<String, Vec<Bar>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<Bar>) {
        self.series.insert(symbol.to_string(), bars);
    }

    /// Builds flat daily series from close prices on consecutive calendar
    /// days. `entries` is `(symbol, first_date, closes)`.
    pub fn from_closes(entries: &[(&str, &str, &[f64])]) -> Self {
        let mut source = Self::new();
        for (symbol, start, closes) in entries {
            let start: NaiveDate = start.parse().unwrap_or_default();
            let bars = closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Bar::flat(start + Days::new(i as u64), close))
                .collect();
            source.insert(symbol, bars);
        }
        source
    }
}

impl BarSource for InMemoryBarSource {
    fn bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimulationError> {
        let Some(series) = self.series.get(symbol) else {
            return Ok(Vec::new());
        };
        market::validate_series(symbol, series)?;
        Ok(market::window(series, start, end))
    }
}

/// Beta source backed by a fixed map; unknown symbols report no beta.
#[derive(Debug, Clone, Default)]
pub struct StaticBetaSource {
    betas: BTreeMap<String, BetaReading>,
}

impl StaticBetaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, beta: f64, is_manual_override: bool) {
        self.betas.insert(
            symbol.to_string(),
            BetaReading {
                beta,
                is_manual_override,
            },
        );
    }
}

impl BetaSource for StaticBetaSource {
    fn beta(&self, symbol: &str) -> Option<BetaReading> {
        self.betas.get(symbol).copied()
    }
}

/// Membership source backed by a fixed map; unknown symbols are always
/// active.
#[derive(Debug, Clone, Default)]
pub struct StaticMembershipSource {
    windows: BTreeMap<String, MembershipWindow>,
}

impl StaticMembershipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, window: MembershipWindow) {
        self.windows.insert(symbol.to_string(), window);
    }
}

impl MembershipSource for StaticMembershipSource {
    fn membership(&self, symbol: &str) -> MembershipWindow {
        self.windows.get(symbol).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_closes_builds_consecutive_days() {
        let source = InMemoryBarSource::from_closes(&[("A", "2024-01-02", &[100.0, 101.0][..])]);
        let bars = source.bars("A", None, None).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date.to_string(), "2024-01-02");
        assert_eq!(bars[1].date.to_string(), "2024-01-03");
        assert_eq!(bars[1].adj_close, 101.0);
    }

    #[test]
    fn test_window_applies() {
        let source = InMemoryBarSource::from_closes(&[(
            "A",
            "2024-01-02",
            &[100.0, 101.0, 102.0][..],
        )]);
        let bars = source
            .bars("A", Some("2024-01-03".parse().unwrap()), None)
            .unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn test_unknown_symbol_is_empty_not_error() {
        let source = InMemoryBarSource::new();
        assert!(source.bars("NOPE", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_static_beta_lookup() {
        let mut source = StaticBetaSource::new();
        source.insert("TSLA", 2.1, false);

        assert_eq!(source.beta("TSLA").unwrap().beta, 2.1);
        assert!(source.beta("KO").is_none());
    }
}
