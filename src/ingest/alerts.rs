/// NWS active alerts feed.
///
/// Fetches the currently active watches, warnings, and advisories for an
/// area from api.weather.gov. The feed is GeoJSON; only the `properties`
/// of each feature are read.
///
/// API Documentation: https://www.weather.gov/documentation/services-web-api

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::get_text;
use crate::model::{ActiveAlert, FetchError};

pub const NWS_BASE_URL: &str = "https://api.weather.gov";

#[derive(Debug, Deserialize)]
struct AlertCollection {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
struct AlertProperties {
    id: String,
    event: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    onset: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

pub fn build_alerts_url(base: &str, area: &str) -> String {
    format!("{}/alerts/active?area={}", base.trim_end_matches('/'), area)
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, FetchError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| FetchError::Parse(format!("invalid alert time '{}': {}", s, e)))
        })
        .transpose()
}

/// Parses an active-alerts GeoJSON body.
pub fn parse_alerts(body: &str) -> Result<Vec<ActiveAlert>, FetchError> {
    let collection: AlertCollection = serde_json::from_str(body)?;

    collection
        .features
        .into_iter()
        .map(|feature| {
            let p = feature.properties;
            Ok(ActiveAlert {
                id: p.id,
                event: p.event,
                severity: p.severity.unwrap_or_else(|| "Unknown".to_string()),
                headline: p.headline,
                onset: parse_optional_time(p.onset)?,
                expires: parse_optional_time(p.expires)?,
            })
        })
        .collect()
}

/// Alerts whose event names a flood hazard ("Flood Warning", "Flash Flood Watch", ...).
pub fn flood_related(alerts: &[ActiveAlert]) -> Vec<&ActiveAlert> {
    alerts
        .iter()
        .filter(|a| a.event.to_ascii_lowercase().contains("flood"))
        .collect()
}

/// Active-alerts feed for one NWS area (state or marine zone code).
#[derive(Debug, Clone)]
pub struct AlertFeed {
    client: reqwest::Client,
    base_url: String,
    area: String,
    key: String,
}

impl AlertFeed {
    pub fn new(client: reqwest::Client, area: &str) -> Self {
        Self {
            client,
            base_url: NWS_BASE_URL.to_string(),
            area: area.to_string(),
            key: format!("nws-alerts:{}", area),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub async fn fetch(&self) -> Result<Vec<ActiveAlert>, FetchError> {
        let body = get_text(&self.client, &build_alerts_url(&self.base_url, &self.area)).await?;
        let alerts = parse_alerts(&body)?;
        tracing::debug!(area = %self.area, count = alerts.len(), "NWS active alerts received");
        Ok(alerts)
    }
}
