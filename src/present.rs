/// Presentation of tick reports.
///
/// A `Presenter` receives every report its monitor produces. The service
/// ships three: `LogPresenter` emits structured `tracing` events,
/// `ConsolePresenter` prints a metrics block (text or one JSON object per
/// line), and `ChannelPresenter` forwards reports over an mpsc channel for
/// embedding and tests.

use std::io::Write;

use serde_json::json;
use tokio::sync::mpsc;

use crate::model::AlertStatus;
use crate::monitor::{TickOutcome, TickReport};

pub trait Presenter: Send {
    fn present(&mut self, report: &TickReport);
}

// ---------------------------------------------------------------------------
// Log presenter
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&mut self, report: &TickReport) {
        let flood_alerts = report.flood_alerts().len();
        match &report.outcome {
            TickOutcome::Evaluated(eval) => match eval.status {
                AlertStatus::Risk => tracing::warn!(
                    source = %report.source,
                    tick = report.tick,
                    current_ft = eval.current,
                    predicted_ft = eval.predicted,
                    threshold_ft = eval.threshold.value(),
                    stale = report.stale,
                    data_stale = report.data_stale,
                    flood_alerts,
                    "FLOOD RISK"
                ),
                AlertStatus::Normal => tracing::info!(
                    source = %report.source,
                    tick = report.tick,
                    current_ft = eval.current,
                    predicted_ft = eval.predicted,
                    threshold_ft = eval.threshold.value(),
                    stale = report.stale,
                    data_stale = report.data_stale,
                    flood_alerts,
                    "normal"
                ),
            },
            TickOutcome::InsufficientData => tracing::warn!(
                source = %report.source,
                tick = report.tick,
                "no readings to evaluate"
            ),
            TickOutcome::Unavailable { error } => tracing::error!(
                source = %report.source,
                tick = report.tick,
                error = %error,
                "gauge data unavailable"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Console presenter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Writes each report to `writer`. Write errors are logged, not returned.
pub struct ConsolePresenter<W: Write + Send> {
    writer: W,
    format: OutputFormat,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn present(&mut self, report: &TickReport) {
        let rendered = match self.format {
            OutputFormat::Text => render_text(report),
            OutputFormat::Json => render_json(report).to_string(),
        };
        if let Err(e) = writeln!(self.writer, "{}", rendered).and_then(|_| self.writer.flush()) {
            tracing::warn!(error = %e, "failed to write report");
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Human-readable metrics block for one report.
pub fn render_text(report: &TickReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} (tick {}) ===\n", report.label, report.tick));

    match &report.outcome {
        TickOutcome::Evaluated(eval) => {
            out.push_str(&format!("Current River Level (ft): {:.2}\n", round_to(eval.current, 2)));
            out.push_str(&format!("Predicted Level (ft): {:.2}\n", round_to(eval.predicted, 2)));
            out.push_str(&format!("Alert Threshold: {}\n", eval.threshold));
            match eval.status {
                AlertStatus::Risk => out.push_str("FLOOD RISK: predicted level exceeds threshold\n"),
                AlertStatus::Normal => out.push_str("NORMAL: predicted level within safe range\n"),
            }
            out.push_str(&format!("Prediction Status: {}\n", eval.status));
        }
        TickOutcome::InsufficientData => out.push_str("Prediction Status: insufficient data\n"),
        TickOutcome::Unavailable { error } => {
            out.push_str(&format!("Prediction Status: unavailable ({})\n", error))
        }
    }

    if let Some(latency) = report.api_latency {
        out.push_str(&format!("API Latency (sec): {:.3}\n", round_to(latency.as_secs_f64(), 3)));
    }
    out.push_str(&format!(
        "Total System Latency (sec): {:.3}\n",
        round_to(report.total_latency.as_secs_f64(), 3)
    ));

    if report.stale {
        out.push_str("WARNING: upstream refresh failed, showing cached data\n");
    }
    if report.data_stale {
        out.push_str("WARNING: gauge has not reported recently\n");
    }

    if let Some(forecast) = &report.forecast {
        out.push_str(&format!(
            "Forecast Rain ({}h): {:.1} mm, peak {:.1} mm/h{}\n",
            forecast.hours,
            forecast.total_mm,
            forecast.peak_mm,
            if forecast.rainfall_event { " (heavy rainfall expected)" } else { "" }
        ));
    }

    if report.alerts.is_some() {
        let flood = report.flood_alerts();
        out.push_str(&format!("Active Flood Alerts: {}\n", flood.len()));
        for alert in flood {
            out.push_str(&format!("  - {} [{}]\n", alert.event, alert.severity));
        }
    }

    let updated = report
        .latest_reading_at
        .unwrap_or(report.reported_at)
        .format("%Y-%m-%d %H:%M:%S UTC");
    out.push_str(&format!("Last Updated: {}", updated));
    out
}

/// One JSON object per report.
pub fn render_json(report: &TickReport) -> serde_json::Value {
    let (status, evaluation, error) = match &report.outcome {
        TickOutcome::Evaluated(eval) => (eval.status.to_string(), Some(eval), None),
        TickOutcome::InsufficientData => ("insufficient_data".to_string(), None, None),
        TickOutcome::Unavailable { error } => ("unavailable".to_string(), None, Some(error.as_str())),
    };

    json!({
        "source": report.source,
        "label": report.label,
        "tick": report.tick,
        "status": status,
        "current_ft": evaluation.map(|e| round_to(e.current, 2)),
        "predicted_ft": evaluation.map(|e| round_to(e.predicted, 2)),
        "threshold_ft": evaluation.map(|e| e.threshold.value()),
        "error": error,
        "stale": report.stale,
        "data_stale": report.data_stale,
        "readings": report.reading_count,
        "latest_reading_at": report.latest_reading_at,
        "api_latency_sec": report.api_latency.map(|d| round_to(d.as_secs_f64(), 3)),
        "total_latency_sec": round_to(report.total_latency.as_secs_f64(), 3),
        "cache_age_sec": report.cache_age.map(|d| round_to(d.as_secs_f64(), 3)),
        "forecast": report.forecast,
        "flood_alerts": report.flood_alerts(),
        "reported_at": report.reported_at,
    })
}

// ---------------------------------------------------------------------------
// Channel presenter
// ---------------------------------------------------------------------------

/// Forwards reports to an unbounded channel. Reports are dropped silently
/// once the receiver is gone.
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<TickReport>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TickReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Presenter for ChannelPresenter {
    fn present(&mut self, report: &TickReport) {
        let _ = self.tx.send(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::weather::ForecastSummary;
    use crate::model::{ActiveAlert, Evaluation, Threshold};
    use crate::monitor::tests::report_with;
    use std::sync::Arc;
    use std::time::Duration;

    fn risk_report() -> TickReport {
        let mut report = report_with(
            4,
            TickOutcome::Evaluated(Evaluation {
                current: 9.456,
                predicted: 8.123,
                threshold: Threshold::default(),
                status: AlertStatus::Risk,
            }),
        );
        report.api_latency = Some(Duration::from_millis(1234));
        report.total_latency = Duration::from_millis(1300);
        report
    }

    #[test]
    fn test_render_text_includes_metrics() {
        let text = render_text(&risk_report());
        assert!(text.contains("Little Falls (tick 4)"));
        assert!(text.contains("Current River Level (ft): 9.46"));
        assert!(text.contains("Predicted Level (ft): 8.12"));
        assert!(text.contains("Alert Threshold: 7.0 ft"));
        assert!(text.contains("FLOOD RISK"));
        assert!(text.contains("Prediction Status: High Risk"));
        assert!(text.contains("API Latency (sec): 1.234"));
        assert!(text.contains("Total System Latency (sec): 1.300"));
        assert!(text.contains("Last Updated: 2024-05-01 13:00:00 UTC"));
        assert!(!text.contains("WARNING"));
    }

    #[test]
    fn test_render_text_unavailable_and_stale() {
        let mut report = report_with(
            2,
            TickOutcome::Unavailable {
                error: "HTTP error: 503".to_string(),
            },
        );
        report.data_stale = true;
        let text = render_text(&report);
        assert!(text.contains("Prediction Status: unavailable (HTTP error: 503)"));
        assert!(text.contains("gauge has not reported recently"));
        assert!(!text.contains("API Latency"));
    }

    #[test]
    fn test_render_text_lists_only_flood_alerts() {
        let mut report = risk_report();
        let alert = |event: &str| ActiveAlert {
            id: event.to_string(),
            event: event.to_string(),
            severity: "Moderate".to_string(),
            headline: None,
            onset: None,
            expires: None,
        };
        report.alerts = Some(Arc::new(vec![alert("Flood Warning"), alert("Heat Advisory")]));
        report.forecast = Some(ForecastSummary {
            hours: 24,
            total_mm: 31.5,
            peak_mm: 6.0,
            rainfall_event: true,
        });

        let text = render_text(&report);
        assert!(text.contains("Active Flood Alerts: 1"));
        assert!(text.contains("- Flood Warning [Moderate]"));
        assert!(!text.contains("Heat Advisory"));
        assert!(text.contains("Forecast Rain (24h): 31.5 mm, peak 6.0 mm/h (heavy rainfall expected)"));
    }

    #[test]
    fn test_render_json_fields() {
        let value = render_json(&risk_report());
        assert_eq!(value["status"], "High Risk");
        assert_eq!(value["current_ft"], 9.46);
        assert_eq!(value["predicted_ft"], 8.12);
        assert_eq!(value["threshold_ft"], 7.0);
        assert_eq!(value["api_latency_sec"], 1.234);
        assert_eq!(value["tick"], 4);
        assert!(value["error"].is_null());

        let unavailable = render_json(&report_with(
            1,
            TickOutcome::Unavailable {
                error: "Request timed out".to_string(),
            },
        ));
        assert_eq!(unavailable["status"], "unavailable");
        assert_eq!(unavailable["error"], "Request timed out");
        assert!(unavailable["current_ft"].is_null());
    }

    #[test]
    fn test_console_presenter_writes_json_lines() {
        let mut presenter = ConsolePresenter::new(Vec::new(), OutputFormat::Json);
        presenter.present(&risk_report());
        presenter.present(&report_with(5, TickOutcome::InsufficientData));

        let output = String::from_utf8(presenter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["status"], "insufficient_data");
    }

    #[tokio::test]
    async fn test_channel_presenter_forwards_reports() {
        let (mut presenter, mut rx) = ChannelPresenter::new();
        presenter.present(&risk_report());
        assert_eq!(rx.recv().await.map(|r| r.tick), Some(4));

        drop(rx);
        // Receiver gone: must not panic.
        presenter.present(&risk_report());
    }
}
