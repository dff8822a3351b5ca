/// Development replay of a saved USGS response.
///
/// When live USGS data is unavailable, point the service at a saved IV
/// JSON file. Each fetch serves a sliding window that advances by one
/// reading, so the monitor sees the series "arrive" as if it were live,
/// wrapping back to the start at the end of the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::usgs::parse_iv_response;
use super::{SeriesSource, into_snapshot};
use crate::model::{FetchError, Reading, Snapshot};

pub struct ReplaySource {
    path: PathBuf,
    readings: Vec<Reading>,
    /// Readings per served window.
    window: usize,
    cursor: AtomicUsize,
    key: String,
}

impl ReplaySource {
    /// Loads the first series of a saved IV response.
    pub fn from_file(path: &Path, window: usize) -> Result<Self, FetchError> {
        let body = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Transport(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_body(&body, path, window)
    }

    pub fn from_body(body: &str, path: &Path, window: usize) -> Result<Self, FetchError> {
        let series = parse_iv_response(body)?
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NoDataAvailable(path.display().to_string()))?;

        let mut readings = series.readings;
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(Self {
            path: path.to_path_buf(),
            readings,
            window: window.max(1),
            cursor: AtomicUsize::new(0),
            key: format!("replay:{}:{}", series.site_code, series.parameter_code),
        })
    }

    /// Number of readings available for replay.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings up to and including the current cursor position.
    fn window_at(&self, step: usize) -> Vec<Reading> {
        if self.readings.is_empty() {
            return Vec::new();
        }
        // First window ends at `window` readings, then grows by one per fetch.
        let first_end = self.window.min(self.readings.len());
        let span = self.readings.len() - first_end + 1;
        let end = first_end + step % span;
        let start = end.saturating_sub(self.window);
        self.readings[start..end].to_vec()
    }
}

#[async_trait]
impl SeriesSource for ReplaySource {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!("replay of {} ({} readings)", self.path.display(), self.readings.len())
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let step = self.cursor.fetch_add(1, Ordering::Relaxed);
        let readings = self.window_at(step);
        Ok(into_snapshot(
            &self.key,
            readings,
            self.window,
            Duration::ZERO,
            Utc::now(),
        ))
    }
}
