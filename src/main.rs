use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use flood_alert_service::config::ServiceConfig;
use flood_alert_service::ingest::alerts::AlertFeed;
use flood_alert_service::ingest::replay::ReplaySource;
use flood_alert_service::ingest::usgs::UsgsGaugeSource;
use flood_alert_service::ingest::weather::WeatherSource;
use flood_alert_service::ingest::{SeriesSource, http_client};
use flood_alert_service::logging::init_logger;
use flood_alert_service::monitor::{Monitor, MonitorContext, MonitorSet, MonitorSettings};
use flood_alert_service::present::{ConsolePresenter, LogPresenter, OutputFormat, Presenter};
use flood_alert_service::shutdown::ShutdownGuard;
use flood_alert_service::{stations, verify};

#[derive(Parser, Debug)]
#[command(name = "flood-alert")]
#[command(about = "Polls river gauges and flags predicted levels above a flood threshold")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "FLOOD_CONFIG")]
    config: Option<PathBuf>,

    /// Flood threshold in feet (5.0 to 15.0)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Run a single tick per gauge and exit
    #[arg(long, conflicts_with = "verify")]
    once: bool,

    /// Fetch each configured source once, print a summary and exit
    #[arg(long)]
    verify: bool,

    /// Print reports (and the verification report) as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServiceConfig::from_toml_str("")?,
    };
    config
        .apply_env_from_process()
        .context("invalid environment override")?;
    if let Some(threshold) = args.threshold {
        config.threshold.value_ft = threshold;
    }
    config.validate().context("invalid configuration")?;

    let _log_guard = init_logger(&config.logging).context("failed to initialise logging")?;

    for site in config.unregistered_sites() {
        tracing::warn!(site, "gauge is not in the station registry");
    }

    let client = http_client(config.http_timeout()).context("failed to build HTTP client")?;
    let gauges = gauge_sources(&config, &client)?;

    if args.verify {
        return run_verify(&config, &client, gauges, args.json).await;
    }

    let threshold = config.threshold()?;
    let settings = MonitorSettings::from_config(&config);
    let context = MonitorContext {
        weather: config.weather_location().map(|(lat, lon)| {
            let hours = config.weather.as_ref().map_or(24, |w| w.forecast_hours);
            Arc::new(WeatherSource::new(client.clone(), lat, lon, hours)) as Arc<dyn SeriesSource>
        }),
        alerts: config
            .alert_area()
            .map(|area| Arc::new(AlertFeed::new(client.clone(), &area))),
        ..MonitorContext::default()
    };

    let format = if args.json { OutputFormat::Json } else { OutputFormat::Text };
    let mut monitors: Vec<Monitor> = gauges
        .into_iter()
        .map(|source| {
            let presenter: Box<dyn Presenter> = if args.once || args.json {
                Box::new(ConsolePresenter::stdout(format))
            } else {
                Box::new(LogPresenter)
            };
            Monitor::new(source, context.clone(), threshold, settings, presenter)
        })
        .collect();

    if args.once {
        for monitor in &mut monitors {
            monitor.tick().await;
        }
        return Ok(());
    }

    tracing::info!(
        monitors = monitors.len(),
        threshold_ft = threshold.value(),
        interval_secs = settings.poll_interval.as_secs(),
        cache_ttl_secs = settings.cache_ttl.as_secs(),
        "starting flood alert service"
    );

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();
    let set = MonitorSet::spawn_all(monitors, shutdown.token());
    let histories = set.join().await;

    let risk_ticks: usize = histories.iter().map(|h| h.risk_count()).sum();
    tracing::info!(monitors = histories.len(), risk_ticks, "flood alert service stopped");
    Ok(())
}

/// The monitored gauges: the replay file when configured, else the live gauges.
fn gauge_sources(config: &ServiceConfig, client: &reqwest::Client) -> Result<Vec<Arc<dyn SeriesSource>>> {
    if let Some(replay) = &config.replay {
        let source = ReplaySource::from_file(&replay.path, replay.window)
            .with_context(|| format!("failed to load replay file {}", replay.path.display()))?;
        tracing::info!(path = %replay.path.display(), readings = source.len(), "replaying saved gauge data");
        return Ok(vec![Arc::new(source)]);
    }

    Ok(config
        .gauges
        .iter()
        .map(|gauge| {
            Arc::new(UsgsGaugeSource::new(
                client.clone(),
                &gauge.site_code,
                &gauge.parameter_code,
                &gauge.period,
                config.monitor.retain_readings,
            )) as Arc<dyn SeriesSource>
        })
        .collect())
}

async fn run_verify(
    config: &ServiceConfig,
    client: &reqwest::Client,
    mut sources: Vec<Arc<dyn SeriesSource>>,
    json: bool,
) -> Result<()> {
    for station in stations::STATION_REGISTRY {
        let registered = sources.iter().any(|s| s.key().contains(station.site_code));
        if !registered {
            for param in station.expected_parameters {
                sources.push(Arc::new(UsgsGaugeSource::new(
                    client.clone(),
                    station.site_code,
                    param,
                    "PT4H",
                    config.monitor.retain_readings,
                )));
            }
        }
    }
    if let Some((lat, lon)) = config.weather_location() {
        let hours = config.weather.as_ref().map_or(24, |w| w.forecast_hours);
        sources.push(Arc::new(WeatherSource::new(client.clone(), lat, lon, hours)));
    }

    let feed = config
        .alert_area()
        .map(|area| AlertFeed::new(client.clone(), &area));
    let report = verify::run_verification(&sources, feed.as_ref()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        verify::print_summary(&report);
    }

    if report.summary.working == 0 {
        anyhow::bail!("no configured source returned data");
    }
    Ok(())
}
