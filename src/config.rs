//! Service configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so an
//! empty file (or no file) monitors the Little Falls gauge with a 7.0 ft
//! threshold. Selected values can be overridden from the environment
//! (`.env` is loaded first by the binary).
//!
//! ```toml
//! [monitor]
//! interval_secs = 30
//! cache_ttl_secs = 60
//!
//! [threshold]
//! value_ft = 7.5
//!
//! [[gauges]]
//! site_code = "01646500"
//! parameter_code = "00065"
//!
//! [alerts]
//! area = "MD"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{ConfigError, PARAM_STAGE, Threshold, THRESHOLD_CONFIG};
use crate::stations;

pub const ENV_THRESHOLD_FT: &str = "FLOOD_THRESHOLD_FT";
pub const ENV_POLL_INTERVAL_SECS: &str = "FLOOD_POLL_INTERVAL_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "FLOOD_CACHE_TTL_SECS";
pub const ENV_LOG_LEVEL: &str = "FLOOD_LOG_LEVEL";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub monitor: MonitorConfig,
    pub threshold: ThresholdSection,
    pub logging: LoggingConfig,
    pub gauges: Vec<GaugeConfig>,
    pub weather: Option<WeatherConfig>,
    pub alerts: Option<AlertsConfig>,
    /// Serve a saved USGS response instead of the live gauges.
    pub replay: Option<ReplayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub cache_ttl_secs: u64,
    /// Readings kept per snapshot.
    pub retain_readings: usize,
    /// Newest reading older than this marks the data as stale.
    pub stale_after_minutes: u64,
    /// Tick reports kept per monitor.
    pub history_len: usize,
    pub http_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            cache_ttl_secs: 60,
            retain_readings: 50,
            stale_after_minutes: 60,
            history_len: 120,
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdSection {
    pub value_ft: f64,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            value_ft: THRESHOLD_CONFIG.default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Append JSON log lines to this file as well.
    pub file: Option<String>,
    /// JSON console output instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaugeConfig {
    pub site_code: String,
    pub parameter_code: String,
    /// ISO 8601 lookback period requested from USGS.
    pub period: String,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            site_code: "01646500".to_string(),
            parameter_code: PARAM_STAGE.to_string(),
            period: "P1D".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherConfig {
    /// Defaults to the first gauge's registered location.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub forecast_hours: u32,
    /// Forecast total at or above this many mm is flagged as a rainfall event.
    pub rainfall_event_mm: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            forecast_hours: 24,
            rainfall_event_mm: 25.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    /// NWS area code; defaults to the first gauge's registered area.
    pub area: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    pub path: PathBuf,
    #[serde(default = "default_replay_window")]
    pub window: usize,
}

fn default_replay_window() -> usize {
    MonitorConfig::default().retain_readings
}

impl ServiceConfig {
    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: ServiceConfig = toml::from_str(text)?;
        if config.gauges.is_empty() && config.replay.is_none() {
            config.gauges.push(GaugeConfig::default());
        }
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_from_process(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_THRESHOLD_FT) {
            self.threshold.value_ft = parse_env(ENV_THRESHOLD_FT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_SECS) {
            self.monitor.interval_secs = parse_env(ENV_POLL_INTERVAL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            self.monitor.cache_ttl_secs = parse_env(ENV_CACHE_TTL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = raw.trim().to_ascii_lowercase();
        }
        Ok(())
    }

    /// Checks every value the service depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold()?;

        let m = &self.monitor;
        for (name, value) in [
            ("monitor.interval_secs", m.interval_secs),
            ("monitor.http_timeout_secs", m.http_timeout_secs),
            ("monitor.retain_readings", m.retain_readings as u64),
            ("monitor.history_len", m.history_len as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than zero", name)));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level '{}' is not one of {:?}",
                self.logging.level, LOG_LEVELS
            )));
        }

        if self.gauges.is_empty() && self.replay.is_none() {
            return Err(ConfigError::Invalid("no gauges configured".to_string()));
        }
        for gauge in &self.gauges {
            if !stations::is_valid_site_code(&gauge.site_code) {
                return Err(ConfigError::Invalid(format!(
                    "gauge site code '{}' is not a valid USGS site code",
                    gauge.site_code
                )));
            }
            if gauge.parameter_code.len() != 5
                || !gauge.parameter_code.chars().all(|c| c.is_ascii_digit())
            {
                return Err(ConfigError::Invalid(format!(
                    "parameter code '{}' for site {} must be 5 digits",
                    gauge.parameter_code, gauge.site_code
                )));
            }
        }

        if let Some(weather) = &self.weather {
            if weather.forecast_hours == 0 {
                return Err(ConfigError::Invalid(
                    "weather.forecast_hours must be greater than zero".to_string(),
                ));
            }
            if weather.latitude.is_some() != weather.longitude.is_some() {
                return Err(ConfigError::Invalid(
                    "weather.latitude and weather.longitude must be set together".to_string(),
                ));
            }
            if self.weather_location().is_none() {
                return Err(ConfigError::Invalid(
                    "weather needs latitude/longitude or a registered first gauge".to_string(),
                ));
            }
        }

        if let Some(replay) = &self.replay {
            if replay.window == 0 {
                return Err(ConfigError::Invalid("replay.window must be greater than zero".to_string()));
            }
        }

        Ok(())
    }

    pub fn threshold(&self) -> Result<Threshold, ConfigError> {
        Threshold::new(self.threshold.value_ft)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.monitor.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.http_timeout_secs)
    }

    /// Configured gauges whose site code is not in the station registry.
    pub fn unregistered_sites(&self) -> Vec<&str> {
        self.gauges
            .iter()
            .map(|g| g.site_code.as_str())
            .filter(|code| stations::find_station(code).is_none())
            .collect()
    }

    /// Forecast point: explicit coordinates, else the first gauge's station.
    pub fn weather_location(&self) -> Option<(f64, f64)> {
        let weather = self.weather.as_ref()?;
        match (weather.latitude, weather.longitude) {
            (Some(lat), Some(lon)) => {
                let valid = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
                valid.then_some((lat, lon))
            }
            _ => self
                .first_station()
                .map(|station| (station.latitude, station.longitude)),
        }
    }

    /// NWS alert area: explicit, else the first gauge's station.
    pub fn alert_area(&self) -> Option<String> {
        let alerts = self.alerts.as_ref()?;
        alerts
            .area
            .clone()
            .or_else(|| self.first_station().map(|s| s.alert_area.to_string()))
    }

    fn first_station(&self) -> Option<&'static stations::Station> {
        self.gauges
            .first()
            .and_then(|g| stations::find_station(&g.site_code))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}='{}' could not be parsed", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_dashboard_defaults() {
        let config = ServiceConfig::from_toml_str("").expect("empty config should parse");
        config.validate().expect("defaults should validate");
        assert_eq!(config.threshold().unwrap().value(), 7.0);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.monitor.retain_readings, 50);
        assert_eq!(config.gauges, vec![GaugeConfig::default()]);
        assert!(config.weather.is_none());
        assert!(config.alerts.is_none());
    }

    #[test]
    fn test_full_file_parses() {
        let text = r#"
            [monitor]
            interval_secs = 5
            cache_ttl_secs = 10
            retain_readings = 30

            [threshold]
            value_ft = 9.5

            [logging]
            level = "debug"
            json = true

            [[gauges]]
            site_code = "01638500"

            [[gauges]]
            site_code = "01613000"
            parameter_code = "00060"
            period = "PT6H"

            [weather]
            forecast_hours = 48

            [alerts]
        "#;
        let config = ServiceConfig::from_toml_str(text).expect("config should parse");
        config.validate().expect("config should validate");
        assert_eq!(config.monitor.interval_secs, 5);
        assert_eq!(config.monitor.stale_after_minutes, 60);
        assert_eq!(config.gauges.len(), 2);
        assert_eq!(config.gauges[0].parameter_code, "00065");
        assert_eq!(config.gauges[1].period, "PT6H");
        // Derived from the Point of Rocks registry entry.
        assert_eq!(config.weather_location(), Some((39.2737, -77.5433)));
        assert_eq!(config.alert_area().as_deref(), Some("MD"));
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[threshold]\nvalue_ft = 12.0").expect("write config");
        let config = ServiceConfig::load(file.path()).expect("file should load");
        assert_eq!(config.threshold().unwrap().value(), 12.0);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = ServiceConfig::load(Path::new("/nonexistent/flood.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let result = ServiceConfig::from_toml_str("[monitor]\ninterval = 5\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_threshold_bounds_are_enforced() {
        for (value, ok) in [(5.0, true), (15.0, true), (4.5, false), (15.5, false)] {
            let text = format!("[threshold]\nvalue_ft = {:.1}\n", value);
            let config = ServiceConfig::from_toml_str(&text).unwrap();
            assert_eq!(config.validate().is_ok(), ok, "threshold {}", value);
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = ServiceConfig::from_toml_str("[monitor]\ninterval_secs = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_site_code_is_rejected() {
        let config =
            ServiceConfig::from_toml_str("[[gauges]]\nsite_code = \"LITTLEFALLS\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_log_level_is_rejected() {
        let config = ServiceConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_THRESHOLD_FT, "8.5"),
            (ENV_POLL_INTERVAL_SECS, "5"),
            (ENV_LOG_LEVEL, "DEBUG"),
        ]);
        let mut config = ServiceConfig::from_toml_str("").unwrap();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .expect("overrides should parse");
        assert_eq!(config.threshold().unwrap().value(), 8.5);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unparsable_env_override_is_rejected() {
        let mut config = ServiceConfig::from_toml_str("").unwrap();
        let result = config.apply_env(|name| (name == ENV_THRESHOLD_FT).then(|| "high".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_replay_only_config_needs_no_gauges() {
        let config =
            ServiceConfig::from_toml_str("[replay]\npath = \"fixtures/iv.json\"\n").unwrap();
        assert!(config.gauges.is_empty());
        assert_eq!(config.replay.as_ref().unwrap().window, 50);
        config.validate().expect("replay config should validate");
    }

    #[test]
    fn test_unregistered_sites_are_listed() {
        let config = ServiceConfig::from_toml_str(
            "[[gauges]]\nsite_code = \"01646500\"\n[[gauges]]\nsite_code = \"99999999\"\n",
        )
        .unwrap();
        assert_eq!(config.unregistered_sites(), vec!["99999999"]);
    }

    #[test]
    fn test_explicit_weather_coordinates_are_range_checked() {
        let config = ServiceConfig::from_toml_str(
            "[weather]\nlatitude = 120.0\nlongitude = -77.0\n",
        )
        .unwrap();
        assert_eq!(config.weather_location(), None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_specified_weather_coordinates_are_rejected() {
        for section in ["[weather]\nlatitude = 39.0\n", "[weather]\nlongitude = -77.0\n"] {
            let config = ServiceConfig::from_toml_str(section).unwrap();
            match config.validate() {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains("set together"), "{}", msg),
                other => panic!("expected invalid config, got {:?}", other),
            }
        }

        // Neither set falls back to the first gauge's station.
        let config = ServiceConfig::from_toml_str("[weather]\n").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.weather_location(), Some((38.9498, -77.1276)));
    }
}
