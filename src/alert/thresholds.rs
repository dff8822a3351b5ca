//! Flood threshold checking.
//!
//! Every evaluation is stateless: there is no hysteresis, debouncing, or
//! alert memory between ticks. The "prediction" is a trailing mean of the
//! most recent readings and nothing more.

use crate::model::{AlertStatus, EvalError, Evaluation, Reading, Snapshot, Threshold};

/// Number of most recent readings averaged into the predicted level.
pub const PREDICTION_WINDOW: usize = 5;

/// Arithmetic mean of the last `min(k, len)` readings.
///
/// Returns `None` for an empty slice or `k == 0`.
pub fn trailing_mean(readings: &[Reading], k: usize) -> Option<f64> {
    let take = k.min(readings.len());
    if take == 0 {
        return None;
    }
    let tail = &readings[readings.len() - take..];
    Some(tail.iter().map(|r| r.value).sum::<f64>() / take as f64)
}

/// Evaluates a snapshot against a threshold.
///
/// `Risk` iff the predicted level is strictly greater than the threshold;
/// a prediction equal to the threshold is `Normal`.
pub fn evaluate(snapshot: &Snapshot, threshold: Threshold) -> Result<Evaluation, EvalError> {
    let current = snapshot.latest().ok_or(EvalError::InsufficientData)?.value;
    let predicted =
        trailing_mean(&snapshot.readings, PREDICTION_WINDOW).ok_or(EvalError::InsufficientData)?;

    let status = if predicted > threshold.value() {
        AlertStatus::Risk
    } else {
        AlertStatus::Normal
    };

    Ok(Evaluation {
        current,
        predicted,
        threshold,
        status,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    fn snapshot_of(values: &[f64]) -> Snapshot {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Snapshot {
            source: "usgs:01646500:00065".to_string(),
            readings: values
                .iter()
                .enumerate()
                .map(|(i, v)| Reading::new(start + ChronoDuration::minutes(15 * i as i64), *v))
                .collect(),
            fetch_latency: Duration::from_millis(120),
            fetched_at: start,
        }
    }

    fn threshold(value: f64) -> Threshold {
        Threshold::new(value).expect("test threshold should be in range")
    }

    #[test]
    fn test_mean_equal_to_threshold_is_normal() {
        // mean(5,6,7,8,9) == 7.0; comparison is strictly greater-than.
        let eval = evaluate(&snapshot_of(&[5.0, 6.0, 7.0, 8.0, 9.0]), threshold(7.0))
            .expect("non-empty snapshot");
        assert_eq!(eval.predicted, 7.0);
        assert_eq!(eval.current, 9.0);
        assert_eq!(eval.status, AlertStatus::Normal);
    }

    #[test]
    fn test_mean_just_above_threshold_is_risk() {
        let snapshot = snapshot_of(&[5.0, 6.0, 7.0, 8.0, 9.0]);
        // 6.9 is off the slider step but inside the bounds.
        let eval = evaluate(&snapshot, threshold(6.9)).expect("non-empty snapshot");
        assert_eq!(eval.status, AlertStatus::Risk);
    }

    #[test]
    fn test_fewer_than_window_readings_uses_all_of_them() {
        let eval = evaluate(&snapshot_of(&[10.0, 12.0]), threshold(10.5)).expect("two readings");
        assert_eq!(eval.predicted, 11.0);
        assert_eq!(eval.current, 12.0);
        assert_eq!(eval.status, AlertStatus::Risk);
    }

    #[test]
    fn test_only_last_five_readings_are_averaged() {
        // The early 100s must not leak into the prediction.
        let eval = evaluate(
            &snapshot_of(&[100.0, 100.0, 6.0, 6.0, 6.0, 6.0, 6.0]),
            threshold(7.0),
        )
        .expect("non-empty snapshot");
        assert_eq!(eval.predicted, 6.0);
        assert_eq!(eval.status, AlertStatus::Normal);
    }

    #[test]
    fn test_single_reading_predicts_itself() {
        let eval = evaluate(&snapshot_of(&[8.25]), threshold(8.0)).expect("one reading");
        assert_eq!(eval.predicted, 8.25);
        assert_eq!(eval.status, AlertStatus::Risk);
    }

    #[test]
    fn test_empty_snapshot_is_insufficient_data() {
        let result = evaluate(&snapshot_of(&[]), Threshold::default());
        assert_eq!(result, Err(EvalError::InsufficientData));
    }

    #[test]
    fn test_trailing_mean_edge_cases() {
        let readings = snapshot_of(&[1.0, 2.0, 3.0]).readings;
        assert_eq!(trailing_mean(&readings, 0), None);
        assert_eq!(trailing_mean(&[], 5), None);
        assert_eq!(trailing_mean(&readings, 2), Some(2.5));
        assert_eq!(trailing_mean(&readings, 10), Some(2.0));
    }

    #[test]
    fn test_evaluation_carries_threshold_used() {
        let eval = evaluate(&snapshot_of(&[6.0]), threshold(12.5)).expect("one reading");
        assert_eq!(eval.threshold.value(), 12.5);
    }
}
