pub mod metrics;

pub use metrics::{BuyAndHoldMetrics, RunMetrics};
