/// Open-Meteo forecast client.
///
/// Retrieves the hourly precipitation forecast for a point near the
/// monitored gauge. Upcoming rainfall is reported alongside the river
/// level; it does not feed the threshold evaluation.
///
/// API Documentation: https://open-meteo.com/en/docs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SeriesSource, get_text, into_snapshot};
use crate::model::{FetchError, Reading, Snapshot};

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";

// ============================================================================
// Open-Meteo Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyForecast,
}

/// Parallel arrays, one entry per forecast hour.
#[derive(Debug, Deserialize)]
struct HourlyForecast {
    time: Vec<String>,
    /// Hourly precipitation sum (mm); null where the model has no value.
    precipitation: Vec<Option<f64>>,
}

/// Rainfall outlook derived from a forecast snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub hours: usize,
    pub total_mm: f64,
    pub peak_mm: f64,
    pub rainfall_event: bool,
}

// ============================================================================
// URL construction and parsing
// ============================================================================

pub fn build_forecast_url(base: &str, latitude: f64, longitude: f64, hours: u32) -> String {
    format!(
        "{}/v1/forecast?latitude={:.4}&longitude={:.4}&hourly=precipitation&forecast_hours={}&timezone=UTC",
        base.trim_end_matches('/'),
        latitude,
        longitude,
        hours
    )
}

/// Parses an hourly forecast body into precipitation readings.
///
/// Hours with a null value are skipped.
pub fn parse_forecast(body: &str) -> Result<Vec<Reading>, FetchError> {
    let response: ForecastResponse = serde_json::from_str(body)?;
    let hourly = response.hourly;

    if hourly.time.len() != hourly.precipitation.len() {
        return Err(FetchError::Parse(format!(
            "hourly arrays differ in length: {} times, {} values",
            hourly.time.len(),
            hourly.precipitation.len()
        )));
    }

    let mut readings = Vec::with_capacity(hourly.time.len());
    for (time, value) in hourly.time.iter().zip(hourly.precipitation) {
        let Some(value) = value else {
            continue;
        };
        // Format with timezone=UTC: "2024-05-01T13:00"
        let naive = NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M")
            .map_err(|e| FetchError::Parse(format!("invalid forecast time '{}': {}", time, e)))?;
        readings.push(Reading::new(DateTime::from_naive_utc_and_offset(naive, Utc), value));
    }

    Ok(readings)
}

// ============================================================================
// Precipitation Analysis Helpers
// ============================================================================

/// Total precipitation over the readings.
pub fn cumulative_precip(readings: &[Reading]) -> f64 {
    readings.iter().map(|r| r.value).sum()
}

/// Detects a significant rainfall event (>= threshold mm over the period).
pub fn detect_rainfall_event(readings: &[Reading], threshold_mm: f64) -> bool {
    cumulative_precip(readings) >= threshold_mm
}

/// Mean precipitation intensity in mm per hour.
pub fn precip_intensity(readings: &[Reading], hours: usize) -> Option<f64> {
    if readings.is_empty() || hours == 0 {
        return None;
    }
    Some(cumulative_precip(readings) / hours as f64)
}

pub fn summarize(snapshot: &Snapshot, rainfall_event_mm: f64) -> ForecastSummary {
    ForecastSummary {
        hours: snapshot.len(),
        total_mm: cumulative_precip(&snapshot.readings),
        peak_mm: snapshot
            .readings
            .iter()
            .map(|r| r.value)
            .fold(0.0, f64::max),
        rainfall_event: detect_rainfall_event(&snapshot.readings, rainfall_event_mm),
    }
}

// ============================================================================
// Source
// ============================================================================

#[derive(Debug, Clone)]
pub struct WeatherSource {
    client: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    hours: u32,
    key: String,
}

impl WeatherSource {
    pub fn new(client: reqwest::Client, latitude: f64, longitude: f64, hours: u32) -> Self {
        Self {
            client,
            base_url: OPEN_METEO_BASE_URL.to_string(),
            latitude,
            longitude,
            hours,
            key: format!("weather:{:.4},{:.4}", latitude, longitude),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn url(&self) -> String {
        build_forecast_url(&self.base_url, self.latitude, self.longitude, self.hours)
    }
}

#[async_trait]
impl SeriesSource for WeatherSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!(
            "Open-Meteo precipitation forecast ({:.4}, {:.4}, {}h)",
            self.latitude, self.longitude, self.hours
        )
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let start = tokio::time::Instant::now();
        let body = get_text(&self.client, &self.url()).await?;
        let latency = start.elapsed();

        let readings = parse_forecast(&body)?;
        Ok(into_snapshot(
            &self.key,
            readings,
            self.hours as usize,
            latency,
            Utc::now(),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
