pub mod bar;

pub use bar::{Bar, MIN_TRADING_DAYS, ensure_min_history, validate_series, window};
