use thiserror::Error;

/// Errors that prevent a simulation run from starting or force it to abort.
///
/// Rejected trades are NOT errors; they are ledger events (see
/// `domain::trading::transaction::RejectReason`).
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("insufficient data for {symbol}: {bars} bars, need at least {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("price data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("runtime invariant violated: {detail} (last transaction: {last_transaction:?})")]
    InvariantViolation {
        detail: String,
        last_transaction: Option<String>,
    },
}

impl SimulationError {
    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            reason: reason.into(),
        }
    }

    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}
