//! Periodic monitor tasks.
//!
//! A `Monitor` owns one gauge source and runs the polling cycle on a fixed
//! cadence: fetch-or-reuse through the sampling cache, evaluate against the
//! threshold, record into its bounded history, hand the report to its
//! presenter. A fetch failure never stops the loop; it shows up in the
//! report as stale or unavailable data.
//!
//! One task runs per monitored source. Tasks share nothing but the caches
//! and stop when their `CancellationToken` is cancelled, after finishing
//! the tick in progress.

pub mod history;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use history::TickHistory;

use crate::alert::{evaluate, stalenesses};
use crate::cache::{Lookup, Origin, SamplingCache};
use crate::config::ServiceConfig;
use crate::ingest::SeriesSource;
use crate::ingest::alerts::{AlertFeed, flood_related};
use crate::ingest::weather::{self, ForecastSummary};
use crate::logging::log_fetch_failure;
use crate::model::{ActiveAlert, AlertStatus, EvalError, Evaluation, FetchError, Snapshot, Threshold};
use crate::present::Presenter;

pub type SnapshotCache = SamplingCache<String, Snapshot>;
pub type AlertCache = SamplingCache<String, Vec<ActiveAlert>>;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What a tick concluded about the river level.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Evaluated(Evaluation),
    /// A snapshot arrived but held no readings.
    InsufficientData,
    /// Nothing could be fetched and nothing was cached.
    Unavailable { error: String },
}

/// Everything one tick produced, handed to the presenter.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Cache key of the gauge source.
    pub source: String,
    pub label: String,
    pub tick: u64,
    pub outcome: TickOutcome,
    /// Served from cache after a failed refresh.
    pub stale: bool,
    /// Newest reading is older than the configured age limit.
    pub data_stale: bool,
    pub latest_reading_at: Option<DateTime<Utc>>,
    pub reading_count: usize,
    /// Upstream request time of the snapshot in use.
    pub api_latency: Option<Duration>,
    /// Time spent in this tick, cache lookups included.
    pub total_latency: Duration,
    pub cache_age: Option<Duration>,
    pub cache_origin: Option<Origin>,
    pub forecast: Option<ForecastSummary>,
    pub alerts: Option<Arc<Vec<ActiveAlert>>>,
    pub reported_at: DateTime<Utc>,
}

impl TickReport {
    pub fn status(&self) -> Option<AlertStatus> {
        match &self.outcome {
            TickOutcome::Evaluated(eval) => Some(eval.status),
            _ => None,
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        match &self.outcome {
            TickOutcome::Evaluated(eval) => Some(eval),
            _ => None,
        }
    }

    /// Active NWS alerts whose event names a flood hazard.
    pub fn flood_alerts(&self) -> Vec<&ActiveAlert> {
        self.alerts
            .as_deref()
            .map(|alerts| flood_related(alerts))
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Settings and context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub cache_ttl: Duration,
    pub stale_after_minutes: u64,
    pub history_len: usize,
    pub rainfall_event_mm: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(60),
            stale_after_minutes: 60,
            history_len: 120,
            rainfall_event_mm: 25.0,
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            cache_ttl: config.cache_ttl(),
            stale_after_minutes: config.monitor.stale_after_minutes,
            history_len: config.monitor.history_len,
            rainfall_event_mm: config
                .weather
                .as_ref()
                .map(|w| w.rainfall_event_mm)
                .unwrap_or(Self::default().rainfall_event_mm),
        }
    }
}

/// Shared auxiliary feeds reported alongside every gauge.
#[derive(Clone)]
pub struct MonitorContext {
    pub snapshots: Arc<SnapshotCache>,
    pub alert_cache: Arc<AlertCache>,
    pub weather: Option<Arc<dyn SeriesSource>>,
    pub alerts: Option<Arc<AlertFeed>>,
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self {
            snapshots: Arc::new(SamplingCache::new()),
            alert_cache: Arc::new(SamplingCache::new()),
            weather: None,
            alerts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    source: Arc<dyn SeriesSource>,
    context: MonitorContext,
    threshold: Threshold,
    settings: MonitorSettings,
    history: TickHistory,
    presenter: Box<dyn Presenter>,
    ticks: u64,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        context: MonitorContext,
        threshold: Threshold,
        settings: MonitorSettings,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        Self {
            source,
            context,
            threshold,
            history: TickHistory::new(settings.history_len),
            settings,
            presenter,
            ticks: 0,
        }
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.threshold = threshold;
    }

    /// Runs one polling cycle and returns its report.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.ticks += 1;

        let key = self.source.key().to_string();
        let context = &self.context;
        let settings = self.settings;
        let (lookup, forecast, alerts) = tokio::join!(
            fetch_snapshot(&context.snapshots, self.source.as_ref(), settings.cache_ttl),
            forecast(context, settings),
            active_alerts(context, settings),
        );

        let reported_at = Utc::now();
        let mut report = TickReport {
            source: key,
            label: self.source.describe(),
            tick: self.ticks,
            outcome: TickOutcome::InsufficientData,
            stale: false,
            data_stale: false,
            latest_reading_at: None,
            reading_count: 0,
            api_latency: None,
            total_latency: Duration::ZERO,
            cache_age: None,
            cache_origin: None,
            forecast,
            alerts,
            reported_at,
        };

        match lookup {
            Ok(lookup) => {
                let snapshot = &lookup.value;
                report.outcome = match evaluate(snapshot, self.threshold) {
                    Ok(eval) => TickOutcome::Evaluated(eval),
                    Err(EvalError::InsufficientData) => TickOutcome::InsufficientData,
                };
                report.stale = lookup.is_stale();
                report.data_stale = stalenesses::snapshot_is_stale_at(
                    snapshot,
                    self.settings.stale_after_minutes,
                    reported_at,
                )
                .unwrap_or(false);
                report.latest_reading_at = snapshot.latest().map(|r| r.timestamp);
                report.reading_count = snapshot.len();
                report.api_latency = Some(snapshot.fetch_latency);
                report.cache_age = Some(lookup.age);
                report.cache_origin = Some(lookup.origin);
            }
            Err(err) => {
                report.outcome = TickOutcome::Unavailable {
                    error: err.to_string(),
                };
            }
        }

        report.total_latency = started.elapsed();
        tracing::debug!(
            source = %report.source,
            tick = report.tick,
            stale = report.stale,
            total_latency_ms = report.total_latency.as_millis() as u64,
            "tick complete"
        );

        self.history.push(report.clone());
        self.presenter.present(&report);
        report
    }

    /// Ticks on a fixed interval until `token` is cancelled.
    ///
    /// The first tick runs immediately. A tick in progress is finished
    /// before the loop exits. Returns the monitor's history.
    pub async fn run(mut self, token: CancellationToken) -> TickHistory {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            source = %self.source.key(),
            interval_secs = self.settings.poll_interval.as_secs(),
            threshold_ft = self.threshold.value(),
            "monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!(source = %self.source.key(), ticks = self.ticks, "monitor stopped");
        self.history
    }
}

async fn forecast(context: &MonitorContext, settings: MonitorSettings) -> Option<ForecastSummary> {
    let source = context.weather.as_ref()?;
    let lookup = fetch_snapshot(&context.snapshots, source.as_ref(), settings.cache_ttl)
        .await
        .ok()?;
    Some(weather::summarize(&lookup.value, settings.rainfall_event_mm))
}

async fn active_alerts(
    context: &MonitorContext,
    settings: MonitorSettings,
) -> Option<Arc<Vec<ActiveAlert>>> {
    let feed = context.alerts.as_ref()?;
    let key = feed.key().to_string();
    let key_ref = key.as_str();
    let lookup = context
        .alert_cache
        .get(&key, settings.cache_ttl, move || async move {
            let result = feed.fetch().await;
            if let Err(err) = &result {
                log_fetch_failure(key_ref, "alerts fetch", err);
            }
            result
        })
        .await
        .ok()?;
    Some(lookup.value)
}

/// Cache lookup for a series source, logging upstream failures.
async fn fetch_snapshot(
    cache: &SnapshotCache,
    source: &dyn SeriesSource,
    ttl: Duration,
) -> Result<Lookup<Snapshot>, FetchError> {
    let key = source.key().to_string();
    let key_ref = key.as_str();
    cache
        .get(&key, ttl, move || async move {
            let result = source.fetch().await;
            if let Err(err) = &result {
                log_fetch_failure(key_ref, "fetch", err);
            }
            result
        })
        .await
}

// ---------------------------------------------------------------------------
// Monitor set
// ---------------------------------------------------------------------------

/// Independent monitor tasks sharing one cancellation token.
pub struct MonitorSet {
    token: CancellationToken,
    tasks: Vec<JoinHandle<TickHistory>>,
}

impl MonitorSet {
    /// Spawns one task per monitor.
    pub fn spawn_all(monitors: Vec<Monitor>, token: CancellationToken) -> Self {
        let tasks = monitors
            .into_iter()
            .map(|monitor| tokio::spawn(monitor.run(token.child_token())))
            .collect();
        Self { token, tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancels every task.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Waits for every task to stop and collects their histories.
    pub async fn join(self) -> Vec<TickHistory> {
        let mut histories = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(history) => histories.push(history),
                Err(e) => tracing::error!(error = %e, "monitor task failed"),
            }
        }
        histories
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
