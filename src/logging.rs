/// Structured logging for the flood alert service
///
/// Installs the `tracing` subscriber (console and optional log file) and
/// provides the failure classification used when an upstream fetch fails,
/// so every failure line carries its source, key, and class.

use std::fmt;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::model::FetchError;

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Usgs,
    Weather,
    Alerts,
    Replay,
    System,
}

impl DataSource {
    /// Derives the tag from a source cache key ("usgs:...", "weather:...").
    pub fn from_key(key: &str) -> Self {
        match key.split(':').next() {
            Some("usgs") => DataSource::Usgs,
            Some("weather") => DataSource::Weather,
            Some("nws-alerts") => DataSource::Alerts,
            Some("replay") => DataSource::Replay,
            _ => DataSource::System,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Usgs => write!(f, "USGS"),
            DataSource::Weather => write!(f, "WEATHER"),
            DataSource::Alerts => write!(f, "NWS"),
            DataSource::Replay => write!(f, "REPLAY"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classifies a fetch failure.
///
/// Empty series and missing sites often mean a gauge is offline or seasonal,
/// which cannot be told apart from a misconfigured site code here. HTTP,
/// transport, and parse failures point at the service or an API change.
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::NoDataAvailable(_) | FetchError::SiteNotFound(_) => FailureType::Unknown,
        FetchError::Http(_)
        | FetchError::Transport(_)
        | FetchError::Timeout
        | FetchError::Parse(_) => FailureType::Unexpected,
    }
}

/// Logs a fetch failure at a level matching its classification.
pub fn log_fetch_failure(key: &str, operation: &str, err: &FetchError) {
    let source = DataSource::from_key(key);
    let failure = classify_fetch_failure(err);

    match failure {
        FailureType::Unexpected => {
            tracing::error!(%source, key, %failure, error = %err, "{} failed", operation)
        }
        FailureType::Unknown => {
            tracing::warn!(%source, key, %failure, error = %err, "{} failed", operation)
        }
    }
}

/// Logs a summary of a verification run.
pub fn log_verification_summary(total: usize, successful: usize, failed: usize) {
    if failed == 0 {
        tracing::info!(total, successful, failed, "verification complete");
    } else if successful == 0 {
        tracing::error!(total, successful, failed, "verification complete");
    } else {
        tracing::warn!(total, successful, failed, "verification complete");
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), level)
}

/// A usable `rust_log` directive string wins; otherwise `level` applies.
fn filter_from(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Installs the global subscriber.
///
/// Console output goes to stderr, human-readable or JSON. With
/// `config.file` set, the same events are appended to that file in JSON.
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the process.
pub fn init_logger(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let console = if config.json {
        tfmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        tfmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    let (file_layer, guard) = match config.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tfmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(console)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
