/// Upstream data adapters.
///
/// Each adapter turns one third-party endpoint into `Snapshot`s (or, for
/// the alerts feed, a list of `ActiveAlert`s). Adapters own request
/// construction and response parsing only; caching, evaluation, and retry
/// cadence live in the monitor.
///
/// Submodules:
/// - `usgs`:    USGS NWIS instantaneous values (river stage / discharge).
/// - `weather`: Open-Meteo hourly precipitation forecast.
/// - `alerts`:  NWS active alerts feed.
/// - `replay`:  serves a saved USGS response as if it were live.

pub mod alerts;
pub mod replay;
pub mod usgs;
pub mod weather;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{FetchError, Reading, Snapshot};

/// User-Agent sent with every request. The NWS API rejects anonymous clients.
pub const USER_AGENT: &str = concat!(
    "flood_alert_service/",
    env!("CARGO_PKG_VERSION"),
    " (river gauge monitor)"
);

/// A source of scalar time-series readings.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Stable cache key for this source.
    fn key(&self) -> &str;

    /// Human-readable description for logs and reports.
    fn describe(&self) -> String;

    /// Fetches the current series.
    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

/// Builds the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FetchError::Transport(e.to_string()))
}

/// Orders readings oldest first and keeps only the last `retain` of them.
pub(crate) fn into_snapshot(
    source: &str,
    mut readings: Vec<Reading>,
    retain: usize,
    fetch_latency: Duration,
    fetched_at: DateTime<Utc>,
) -> Snapshot {
    readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let skip = readings.len().saturating_sub(retain);
    Snapshot {
        source: source.to_string(),
        readings: readings.split_off(skip),
        fetch_latency,
        fetched_at,
    }
}

/// GETs `url` and returns the body, mapping non-2xx statuses to `FetchError::Http`.
pub(crate) async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http(status.as_u16()));
    }

    Ok(response.text().await?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned response to every request on a local port and
    /// returns its base URL. `delay` is slept before answering.
    pub(crate) async fn serve_canned(status: &'static str, body: String, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_text_maps_status_and_body() {
        let client = http_client(Duration::from_secs(5)).unwrap();

        let ok = serve_canned("200 OK", "{\"ok\":true}".to_string(), Duration::ZERO).await;
        assert_eq!(get_text(&client, &ok).await.unwrap(), "{\"ok\":true}");

        let unavailable = serve_canned("503 Service Unavailable", String::new(), Duration::ZERO).await;
        assert_eq!(get_text(&client, &unavailable).await, Err(FetchError::Http(503)));
    }

    #[tokio::test]
    async fn test_slow_server_maps_to_timeout() {
        let client = http_client(Duration::from_millis(100)).unwrap();
        let slow = serve_canned("200 OK", "{}".to_string(), Duration::from_secs(5)).await;
        assert_eq!(get_text(&client, &slow).await, Err(FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = http_client(Duration::from_secs(5)).unwrap();
        let result = get_text(&client, &format!("http://{}", addr)).await;
        assert!(matches!(result, Err(FetchError::Transport(_))), "got {:?}", result);
    }

    #[test]
    fn test_into_snapshot_sorts_and_keeps_newest() {
        let at = |minute| Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        let readings = vec![
            Reading::new(at(30), 3.0),
            Reading::new(at(0), 1.0),
            Reading::new(at(45), 4.0),
            Reading::new(at(15), 2.0),
        ];

        let snapshot = into_snapshot("usgs:01646500:00065", readings, 3, Duration::from_millis(80), at(50));
        let values: Vec<f64> = snapshot.readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(snapshot.latest().map(|r| r.timestamp), Some(at(45)));
        assert_eq!(snapshot.fetch_latency, Duration::from_millis(80));
    }

    #[test]
    fn test_into_snapshot_retain_larger_than_input() {
        let now = Utc::now();
        let snapshot = into_snapshot("replay:x:y", vec![Reading::new(now, 5.0)], 50, Duration::ZERO, now);
        assert_eq!(snapshot.len(), 1);
    }
}
