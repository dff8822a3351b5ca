//! Data Source Verification Module
//!
//! Fetches each configured source once against the live APIs to determine
//! which gauges and feeds are reachable and returning data. Run it with
//! `flood-alert --verify` before adding a new gauge to the config.
//!
//! Progress lines go to stderr so stdout carries only the summary or the
//! JSON report.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::SeriesSource;
use crate::ingest::alerts::AlertFeed;
use crate::logging::{log_fetch_failure, log_verification_summary};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<SourceVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceVerification {
    pub key: String,
    pub description: String,
    pub status: VerificationStatus,
    pub sample_data_count: usize,
    pub latest_value: Option<f64>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    /// Responded, but with no readings.
    PartialSuccess,
    Failed,
}

// ============================================================================
// Verification
// ============================================================================

/// Fetches `source` once and classifies the outcome.
pub async fn verify_source(source: &dyn SeriesSource) -> SourceVerification {
    let mut result = SourceVerification {
        key: source.key().to_string(),
        description: source.describe(),
        status: VerificationStatus::Failed,
        sample_data_count: 0,
        latest_value: None,
        latency_ms: 0,
        error_message: None,
    };

    match source.fetch().await {
        Ok(snapshot) => {
            result.sample_data_count = snapshot.len();
            result.latest_value = snapshot.latest().map(|r| r.value);
            result.latency_ms = duration_ms(snapshot.fetch_latency);
            result.status = if snapshot.is_empty() {
                VerificationStatus::PartialSuccess
            } else {
                VerificationStatus::Success
            };
        }
        Err(e) => {
            log_fetch_failure(source.key(), "verification", &e);
            result.error_message = Some(e.to_string());
        }
    }

    result
}

/// Fetches the NWS feed once. An empty feed is a success: no active alerts.
pub async fn verify_alert_feed(feed: &AlertFeed) -> SourceVerification {
    let mut result = SourceVerification {
        key: feed.key().to_string(),
        description: format!("NWS active alerts ({})", feed.area()),
        status: VerificationStatus::Failed,
        sample_data_count: 0,
        latest_value: None,
        latency_ms: 0,
        error_message: None,
    };

    let start = tokio::time::Instant::now();
    match feed.fetch().await {
        Ok(alerts) => {
            result.latency_ms = duration_ms(start.elapsed());
            result.sample_data_count = alerts.len();
            result.status = VerificationStatus::Success;
        }
        Err(e) => {
            log_fetch_failure(feed.key(), "verification", &e);
            result.error_message = Some(e.to_string());
        }
    }

    result
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl VerificationReport {
    fn new(expected: usize) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            results: Vec::with_capacity(expected),
            summary: VerificationSummary::default(),
        }
    }

    /// Adds a result to the report and prints its progress line to stderr.
    pub fn record(&mut self, result: SourceVerification) {
        self.summary.total += 1;
        match result.status {
            VerificationStatus::Success => {
                eprintln!(
                    "  {} ... ✓ OK ({} readings, {} ms)",
                    result.key, result.sample_data_count, result.latency_ms
                );
                self.summary.working += 1;
            }
            VerificationStatus::PartialSuccess => {
                eprintln!("  {} ... ⚠ Responsive but no data", result.key);
                self.summary.working += 1;
            }
            VerificationStatus::Failed => {
                eprintln!(
                    "  {} ... ✗ FAILED: {}",
                    result.key,
                    result.error_message.as_deref().unwrap_or("Unknown")
                );
                self.summary.failed += 1;
            }
        }
        self.results.push(result);
    }
}

/// Verifies every source in order, then the alert feed if one is given.
pub async fn run_verification(
    sources: &[Arc<dyn SeriesSource>],
    alert_feed: Option<&AlertFeed>,
) -> VerificationReport {
    let expected = sources.len() + usize::from(alert_feed.is_some());
    let mut report = VerificationReport::new(expected);

    eprintln!("\n🔍 Verifying {} data sources...", expected);
    for source in sources {
        report.record(verify_source(source.as_ref()).await);
    }
    if let Some(feed) = alert_feed {
        report.record(verify_alert_feed(feed).await);
    }

    log_verification_summary(report.summary.total, report.summary.working, report.summary.failed);
    report
}

pub fn success_rate(summary: &VerificationSummary) -> f64 {
    if summary.total > 0 {
        (summary.working as f64 / summary.total as f64) * 100.0
    } else {
        0.0
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Sources:    {}/{} working  ({} failed)",
        report.summary.working, report.summary.total, report.summary.failed
    );
    for result in report.results.iter().filter(|r| r.status == VerificationStatus::Failed) {
        println!("  ✗ {} ({})", result.key, result.description);
    }
    println!();
    println!(
        "Overall Success Rate: {:.1}% ({}/{})",
        success_rate(&report.summary),
        report.summary.working,
        report.summary.total
    );
    println!("═══════════════════════════════════════════════════════════");
}
