//! Threshold evaluation and data staleness checks.

pub mod stalenesses;
pub mod thresholds;

pub use thresholds::{PREDICTION_WINDOW, evaluate, trailing_mean};
