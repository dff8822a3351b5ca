/// Gauge reading staleness detection.
///
/// USGS gauges update every 15 minutes under normal conditions. A sensor
/// outage or communication failure may not be obvious from the dashboard,
/// because the API keeps serving the last value it received. This module
/// flags snapshots whose newest reading is too old.
///
/// # Clock injection
/// All `*_at` functions accept a `now: DateTime<Utc>` parameter rather than
/// calling `Utc::now()` internally, so tests stay deterministic.

use chrono::{DateTime, Utc};

use crate::model::{Reading, Snapshot};

/// Age of a reading in whole minutes relative to `now`.
///
/// Readings stamped in the future report an age of zero.
pub fn age_minutes_at(reading: &Reading, now: DateTime<Utc>) -> u64 {
    (now - reading.timestamp).num_minutes().max(0) as u64
}

/// Returns `true` if the reading is older than `max_age_minutes`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
pub fn is_stale_at(reading: &Reading, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    age_minutes_at(reading, now) > max_age_minutes
}

/// Checks the newest reading of a snapshot.
///
/// An empty snapshot has nothing to judge and returns `None`.
pub fn snapshot_is_stale_at(
    snapshot: &Snapshot,
    max_age_minutes: u64,
    now: DateTime<Utc>,
) -> Option<bool> {
    snapshot
        .latest()
        .map(|reading| is_stale_at(reading, max_age_minutes, now))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
