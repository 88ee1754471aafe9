//! Seams to the external data world. The simulator core depends on these
//! traits only; concrete sources live in `infrastructure`.

use crate::domain::errors::SimulationError;
use crate::domain::market::Bar;
use crate::domain::params::beta::BetaReading;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Read-only provider of finite, date-ascending daily bar series.
/// Calendar gaps (weekends, holidays) are omitted, never interpolated.
pub trait BarSource {
    fn bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimulationError>;
}

/// Optional beta provider; `None` disables beta scaling for the symbol.
pub trait BetaSource {
    fn beta(&self, symbol: &str) -> Option<BetaReading>;
}

/// Inclusive-exclusive index-constituency window. A symbol with no window
/// on record is always active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipWindow {
    pub add_date: Option<NaiveDate>,
    pub remove_date: Option<NaiveDate>,
}

impl MembershipWindow {
    /// Whether the symbol may trade on `date` (`[add_date, remove_date)`).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.add_date.is_none_or(|a| date >= a) && self.remove_date.is_none_or(|r| date < r)
    }
}

/// Optional index-membership provider; defaults to always active.
pub trait MembershipSource {
    fn membership(&self, symbol: &str) -> MembershipWindow;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_membership_window_half_open() {
        let window = MembershipWindow {
            add_date: Some(date("2024-01-10")),
            remove_date: Some(date("2024-03-01")),
        };

        assert!(!window.contains(date("2024-01-09")));
        assert!(window.contains(date("2024-01-10")));
        assert!(window.contains(date("2024-02-29")));
        assert!(!window.contains(date("2024-03-01")));
    }

    #[test]
    fn test_default_window_always_active() {
        let window = MembershipWindow::default();
        assert!(window.contains(date("1990-01-01")));
        assert!(window.contains(date("2090-01-01")));
    }
}
