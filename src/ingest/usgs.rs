/// USGS NWIS Instantaneous Values (IV) client.
///
/// Retrieves gage height and discharge time series from the USGS Water
/// Services API and turns them into `Snapshot`s.
///
/// API Documentation: https://waterservices.usgs.gov/docs/instantaneous-values/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{SeriesSource, get_text, into_snapshot};
use crate::model::{FetchError, GaugeSeries, Reading, Snapshot};

pub const USGS_BASE_URL: &str = "https://waterservices.usgs.gov";

/// Value USGS uses in place of a missing measurement.
pub const NO_DATA_SENTINEL: f64 = -999999.0;

// ============================================================================
// IV API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct IvResponse {
    value: IvValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvValue {
    #[serde(default)]
    time_series: Vec<IvTimeSeries>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvTimeSeries {
    source_info: IvSourceInfo,
    variable: IvVariable,
    #[serde(default)]
    values: Vec<IvValueSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvSourceInfo {
    site_name: String,
    site_code: Vec<IvCode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvVariable {
    variable_code: Vec<IvCode>,
    unit: IvUnit,
    no_data_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IvCode {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvUnit {
    unit_code: String,
}

#[derive(Debug, Deserialize)]
struct IvValueSet {
    #[serde(default)]
    value: Vec<IvPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IvPoint {
    value: String,
    date_time: String,
}

// ============================================================================
// URL construction and parsing
// ============================================================================

/// Builds an IV request URL against the public USGS host.
///
/// `period` is an ISO 8601 duration such as `"P1D"` or `"PT3H"`; an empty
/// period asks USGS for the most recent value only.
pub fn build_iv_url(sites: &[&str], params: &[&str], period: &str) -> String {
    build_iv_url_with_base(USGS_BASE_URL, sites, params, period)
}

pub fn build_iv_url_with_base(base: &str, sites: &[&str], params: &[&str], period: &str) -> String {
    let mut url = format!(
        "{}/nwis/iv/?format=json&sites={}&parameterCd={}&siteStatus=all",
        base.trim_end_matches('/'),
        sites.join(","),
        params.join(",")
    );
    if !period.is_empty() {
        url.push_str("&period=");
        url.push_str(period);
    }
    url
}

/// Parses an IV timestamp (ISO 8601 with offset) into UTC.
pub fn parse_reading_time(datetime: &str) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc3339(datetime)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FetchError::Parse(format!("invalid dateTime '{}': {}", datetime, e)))
}

/// Parses an IV JSON body into one `GaugeSeries` per site/parameter pair.
///
/// Sentinel values are dropped, so a series may come back with no
/// readings. A response with no `timeSeries` entries at all is
/// `FetchError::NoDataAvailable`.
pub fn parse_iv_response(body: &str) -> Result<Vec<GaugeSeries>, FetchError> {
    let response: IvResponse = serde_json::from_str(body)?;

    if response.value.time_series.is_empty() {
        return Err(FetchError::NoDataAvailable(
            "No timeSeries entries in response".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(response.value.time_series.len());
    for ts in response.value.time_series {
        let site_code = first_code(&ts.source_info.site_code, "siteCode")?;
        let parameter_code = first_code(&ts.variable.variable_code, "variableCode")?;
        let sentinel = ts.variable.no_data_value.unwrap_or(NO_DATA_SENTINEL);

        let mut readings = Vec::new();
        for point in ts.values.iter().flat_map(|set| set.value.iter()) {
            let value: f64 = point.value.trim().parse().map_err(|_| {
                FetchError::Parse(format!("non-numeric value '{}' for site {}", point.value, site_code))
            })?;
            if value == sentinel {
                continue;
            }
            readings.push(Reading::new(parse_reading_time(&point.date_time)?, value));
        }

        out.push(GaugeSeries {
            site_code,
            site_name: ts.source_info.site_name,
            parameter_code,
            unit: ts.variable.unit.unit_code,
            readings,
        });
    }

    Ok(out)
}

fn first_code(codes: &[IvCode], field: &str) -> Result<String, FetchError> {
    codes
        .first()
        .map(|c| c.value.clone())
        .ok_or_else(|| FetchError::Parse(format!("timeSeries entry without {}", field)))
}

// ============================================================================
// Source
// ============================================================================

/// Fetches one parameter of one gauge.
#[derive(Debug, Clone)]
pub struct UsgsGaugeSource {
    client: reqwest::Client,
    base_url: String,
    site_code: String,
    parameter_code: String,
    period: String,
    retain: usize,
    key: String,
}

impl UsgsGaugeSource {
    pub fn new(
        client: reqwest::Client,
        site_code: &str,
        parameter_code: &str,
        period: &str,
        retain: usize,
    ) -> Self {
        Self {
            client,
            base_url: USGS_BASE_URL.to_string(),
            site_code: site_code.to_string(),
            parameter_code: parameter_code.to_string(),
            period: period.to_string(),
            retain,
            key: format!("usgs:{}:{}", site_code, parameter_code),
        }
    }

    /// Points the source at a different host (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn site_code(&self) -> &str {
        &self.site_code
    }

    pub fn url(&self) -> String {
        build_iv_url_with_base(
            &self.base_url,
            &[&self.site_code],
            &[&self.parameter_code],
            &self.period,
        )
    }

    /// Picks this source's series out of a parsed response and trims it.
    pub fn snapshot_from_body(
        &self,
        body: &str,
        fetch_latency: std::time::Duration,
        fetched_at: DateTime<Utc>,
    ) -> Result<Snapshot, FetchError> {
        let series = parse_iv_response(body)?
            .into_iter()
            .find(|s| s.site_code == self.site_code && s.parameter_code == self.parameter_code)
            .ok_or_else(|| FetchError::SiteNotFound(self.site_code.clone()))?;

        Ok(into_snapshot(
            &self.key,
            series.readings,
            self.retain,
            fetch_latency,
            fetched_at,
        ))
    }
}

#[async_trait]
impl SeriesSource for UsgsGaugeSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        match crate::stations::find_station(&self.site_code) {
            Some(station) => format!("{} ({}, {})", station.name, self.site_code, self.parameter_code),
            None => format!("USGS {} ({})", self.site_code, self.parameter_code),
        }
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let url = self.url();
        let start = tokio::time::Instant::now();
        let body = get_text(&self.client, &url).await?;
        let latency = start.elapsed();

        tracing::debug!(site = %self.site_code, latency_ms = latency.as_millis() as u64, "USGS IV response received");
        self.snapshot_from_body(&body, latency, Utc::now())
    }
}

// ============================================================================
// Tests
// ============================================================================
