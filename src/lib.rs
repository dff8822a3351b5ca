//! River gauge polling and flood-threshold alerting.
//!
//! Polls USGS instantaneous-value gauges through a TTL sampling cache,
//! evaluates a trailing-mean prediction against a configurable threshold,
//! and reports each tick to a presenter. Optional context feeds: Open-Meteo
//! precipitation forecast and NWS active alerts.

pub mod alert;
pub mod cache;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod present;
pub mod shutdown;
pub mod stations;
pub mod verify;
