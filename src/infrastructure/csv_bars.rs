//! CSV-backed daily bar source.
//!
//! One file per symbol under a data directory, `<SYMBOL>.csv`, with the
//! header `date,open,high,low,close,adj_close,volume`. Dates are plain
//! `YYYY-MM-DD` calendar dates; non-trading days are simply absent.

use crate::domain::errors::SimulationError;
use crate::domain::market::{self, Bar};
use crate::domain::ports::BarSource;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adj_close: f64,
    volume: f64,
}

impl From<CsvBar> for Bar {
    fn from(row: CsvBar) -> Self {
        Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adj_close: row.adj_close,
            volume: row.volume,
        }
    }
}

/// Reads `<data_dir>/<SYMBOL>.csv` on every query; callers that sweep the
/// same symbol pre-fetch once and pass bars around instead.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    data_dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }
}

impl BarSource for CsvBarSource {
    fn bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, SimulationError> {
        let path = self.path_for(symbol);
        let mut reader = csv::Reader::from_path(&path).map_err(|e| {
            SimulationError::data_unavailable(symbol, format!("{}: {}", path.display(), e))
        })?;

        let mut bars: Vec<Bar> = Vec::new();
        for row in reader.deserialize::<CsvBar>() {
            let row = row.map_err(|e| {
                SimulationError::data_unavailable(symbol, format!("{}: {}", path.display(), e))
            })?;
            bars.push(row.into());
        }
        market::validate_series(symbol, &bars)?;
        debug!("{}: loaded {} bars from {}", symbol, bars.len(), path.display());

        Ok(market::window(&bars, start, end))
    }
}
