pub mod aggregator;
pub mod alerts;
pub mod auditor;
pub mod ensemble;
pub mod indicators;
pub mod predictor;
pub mod scheduler;

/// Round to a fixed number of decimal places for outward-facing values.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
