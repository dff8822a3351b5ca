/// Station registry for the flood alert service.
///
/// Lists the USGS gauge stations this service knows about, with their
/// metadata. Monitors use it to label their reports, and configuration
/// validation uses it to warn about site codes it has never heard of.
/// Configured gauges are not limited to this list.

pub use crate::model::{PARAM_DISCHARGE, PARAM_STAGE};

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single USGS gauge station.
pub struct Station {
    /// 8-digit USGS site code.
    pub site_code: &'static str,
    /// Official USGS site name.
    pub name: &'static str,
    /// Human-readable description of the station's role in flood monitoring.
    pub description: &'static str,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// NWS zone/state code used for the active-alerts feed.
    pub alert_area: &'static str,
    /// Which parameters this station is expected to provide.
    pub expected_parameters: &'static [&'static str],
}

/// Known stations, ordered downstream to upstream along the Potomac.
///
/// Sources:
///   - Site codes: USGS NWIS (waterservices.usgs.gov)
pub static STATION_REGISTRY: &[Station] = &[
    Station {
        site_code: "01646500",
        name: "Potomac River near Wash, DC Little Falls Pump Sta",
        description: "Default monitoring gauge. Last free-flowing gauge above \
                      the tidal Potomac; reflects the full upstream basin.",
        latitude: 38.9498,
        longitude: -77.1276,
        alert_area: "MD",
        expected_parameters: &[PARAM_DISCHARGE, PARAM_STAGE],
    },
    Station {
        site_code: "01638500",
        name: "Potomac River at Point of Rocks, MD",
        description: "Upstream main-stem gauge; rises here lead Little Falls \
                      by roughly a day.",
        latitude: 39.2737,
        longitude: -77.5433,
        alert_area: "MD",
        expected_parameters: &[PARAM_DISCHARGE, PARAM_STAGE],
    },
    Station {
        site_code: "01613000",
        name: "Potomac River at Hancock, MD",
        description: "Far upstream main-stem gauge below the confluence of the \
                      North and South Branches.",
        latitude: 39.6968,
        longitude: -78.1775,
        alert_area: "MD",
        expected_parameters: &[PARAM_DISCHARGE, PARAM_STAGE],
    },
];

/// Returns the site codes for all registered stations.
pub fn all_site_codes() -> Vec<&'static str> {
    STATION_REGISTRY.iter().map(|s| s.site_code).collect()
}

/// Returns site codes that expect a specific parameter.
pub fn sites_with_parameter(param_code: &str) -> Vec<&'static str> {
    STATION_REGISTRY
        .iter()
        .filter(|s| s.expected_parameters.contains(&param_code))
        .map(|s| s.site_code)
        .collect()
}

/// Checks if a station is expected to provide a specific parameter.
pub fn station_has_parameter(site_code: &str, param_code: &str) -> bool {
    find_station(site_code)
        .map(|s| s.expected_parameters.contains(&param_code))
        .unwrap_or(false)
}

/// Looks up a station by site code. Returns `None` if not found.
pub fn find_station(site_code: &str) -> Option<&'static Station> {
    STATION_REGISTRY.iter().find(|s| s.site_code == site_code)
}

/// USGS site codes are 8 to 15 digit numeric strings.
pub fn is_valid_site_code(site_code: &str) -> bool {
    (8..=15).contains(&site_code.len()) && site_code.chars().all(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
