/// Core data types for the flood alert service.
///
/// This module defines the shared domain model imported by all other modules:
/// readings, snapshots, the threshold control, alert status, and the error
/// types. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Parameter codes
// ---------------------------------------------------------------------------

/// USGS parameter code for discharge (streamflow), in cubic feet per second.
pub const PARAM_DISCHARGE: &str = "00060";

/// USGS parameter code for gage height (stage), in feet.
pub const PARAM_STAGE: &str = "00065";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single scalar measurement at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One fetched batch of readings plus fetch metadata.
///
/// Readings are ordered oldest to newest. A snapshot is never mutated after
/// the adapter produces it; the next successful fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Key of the source that produced this snapshot (e.g. "usgs:01646500:00065").
    pub source: String,
    pub readings: Vec<Reading>,
    /// Wall time spent in the upstream request.
    pub fetch_latency: Duration,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// A parsed USGS time series for one site and parameter, before it is
/// trimmed into a `Snapshot`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSeries {
    pub site_code: String,
    pub site_name: String,
    pub parameter_code: String,
    pub unit: String,
    pub readings: Vec<Reading>,
}

/// One entry of the NWS active-alerts feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveAlert {
    pub id: String,
    pub event: String,
    pub severity: String,
    pub headline: Option<String>,
    pub onset: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// Bounds of the river-level threshold control, in feet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub step: f64,
}

/// The threshold control used by the dashboard: 5.0–15.0 ft in 0.5 ft steps.
pub const THRESHOLD_CONFIG: ThresholdConfig = ThresholdConfig {
    min: 5.0,
    max: 15.0,
    default: 7.0,
    step: 0.5,
};

impl ThresholdConfig {
    /// Accepts `value` if it lies within `[min, max]` (both inclusive).
    pub fn validate(&self, value: f64) -> Result<Threshold, ConfigError> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(ConfigError::ThresholdOutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(Threshold(value))
    }

    /// Clamps `value` into range and snaps it to the nearest step.
    ///
    /// Non-finite input falls back to the default.
    pub fn clamp(&self, value: f64) -> Threshold {
        if !value.is_finite() {
            return Threshold(self.default);
        }
        let bounded = value.clamp(self.min, self.max);
        let steps = ((bounded - self.min) / self.step).round();
        Threshold((self.min + steps * self.step).min(self.max))
    }
}

/// A validated flood threshold in feet.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Threshold(f64);

impl Threshold {
    /// Validates against `THRESHOLD_CONFIG`.
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        THRESHOLD_CONFIG.validate(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold(THRESHOLD_CONFIG.default)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} ft", self.0)
    }
}

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Binary risk status derived from a snapshot and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertStatus {
    Normal,
    Risk,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Normal => write!(f, "Normal"),
            AlertStatus::Risk => write!(f, "High Risk"),
        }
    }
}

/// Result of evaluating one snapshot against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// Most recent reading.
    pub current: f64,
    /// Trailing mean of the most recent readings.
    pub predicted: f64,
    pub threshold: Threshold,
    pub status: AlertStatus,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or parsing upstream data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// Connection, DNS, or TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
    /// The response body could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The requested site code was not found in the response.
    #[error("Site not found: {0}")]
    SiteNotFound(String),
    /// The site was found but contained no usable data values
    /// (empty array or sentinel -999999).
    #[error("No data available for site: {0}")]
    NoDataAvailable(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Http(status.as_u16())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Errors from the threshold evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The snapshot holds no readings, so there is no current or predicted level.
    #[error("insufficient data: snapshot contains no readings")]
    InsufficientData,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("threshold {value} ft is outside the allowed range [{min}, {max}]")]
    ThresholdOutOfRange { value: f64, min: f64, max: f64 },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
