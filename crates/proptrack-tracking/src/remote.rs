//! HTTP client for the remote point-tracking service.
//!
//! Wire format:
//! - `GET  {base_url}/health` once per client, before the first request
//! - `POST {base_url}/track` with `{"video_base64": .., "query_points": [..]}`
//!   answered by `{"tracks": [{"label", "color", "points": [..]}]}`
//!
//! Connection failures and 5xx responses are retried with exponential
//! backoff. Timeouts, 4xx responses and malformed bodies are not.

use crate::point_tracker::{PointTracker, QueryPoint, Track};
use async_trait::async_trait;
use base64::Engine;
use proptrack_core::{CancelToken, ProptrackError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Remote tracker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: String,
    /// Whole-request deadline for `/track`.
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `retry_backoff_ms * 2^n`.
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Probe `/health` during session initialization.
    pub health_check: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 300_000,
            connect_timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            health_check: true,
        }
    }
}

impl TrackerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .retry_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp.min(self.max_backoff_ms))
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), route)
    }
}

#[derive(Serialize)]
struct TrackRequest<'a> {
    video_base64: String,
    query_points: &'a [QueryPoint],
}

#[derive(Deserialize)]
struct TrackResponse {
    tracks: Vec<Track>,
}

/// Outcome of a single `/track` attempt.
enum AttemptError {
    Transient(String),
    Fatal(ProptrackError),
}

/// Long-lived client for the tracking service.
///
/// The HTTP session is created lazily by the first caller of
/// [`RemoteTracker::connect`]; concurrent callers wait for that
/// initialization instead of repeating it. A failed initialization is not
/// cached, so the next call tries again.
pub struct RemoteTracker {
    config: TrackerConfig,
    session: OnceCell<Client>,
}

impl RemoteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            session: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    /// Initialize the session (idempotent).
    pub async fn connect(&self) -> Result<&Client> {
        self.session
            .get_or_try_init(|| async {
                let client = Client::builder()
                    .connect_timeout(self.config.connect_timeout())
                    .build()
                    .map_err(|e| ProptrackError::TrackerUnavailable(format!("client setup: {e}")))?;
                if self.config.health_check {
                    self.health(&client).await?;
                }
                info!(base_url = %self.config.base_url, "tracker session ready");
                Ok::<Client, ProptrackError>(client)
            })
            .await
    }

    async fn health(&self, client: &Client) -> Result<()> {
        let response = client
            .get(self.config.url("health"))
            .timeout(self.config.connect_timeout())
            .send()
            .await
            .map_err(|e| ProptrackError::TrackerUnavailable(format!("health check: {e}")))?;
        if !response.status().is_success() {
            return Err(ProptrackError::TrackerUnavailable(format!(
                "health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn attempt(&self, client: &Client, body: &TrackRequest<'_>) -> std::result::Result<Vec<Track>, AttemptError> {
        let response = client
            .post(self.config.url("track"))
            .timeout(self.config.request_timeout())
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("server returned {status}")));
        }
        if status != StatusCode::OK {
            return Err(AttemptError::Fatal(ProptrackError::TrackerUnavailable(format!(
                "tracker rejected request with {status}"
            ))));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        let parsed: TrackResponse = serde_json::from_slice(&bytes).map_err(|e| {
            AttemptError::Fatal(ProptrackError::TrackerUnavailable(format!(
                "malformed tracker response: {e}"
            )))
        })?;
        Ok(parsed.tracks)
    }

    fn classify(&self, err: reqwest::Error) -> AttemptError {
        if err.is_timeout() {
            AttemptError::Fatal(ProptrackError::TrackerTimeout(self.config.request_timeout()))
        } else if err.is_connect() || err.is_request() {
            AttemptError::Transient(err.to_string())
        } else {
            AttemptError::Fatal(ProptrackError::TrackerUnavailable(err.to_string()))
        }
    }
}

#[async_trait]
impl PointTracker for RemoteTracker {
    async fn track_points(
        &self,
        video: &Path,
        query: &[QueryPoint],
        cancel: &CancelToken,
    ) -> Result<Vec<Track>> {
        cancel.check()?;
        let bytes = tokio::fs::read(video).await.map_err(|e| {
            ProptrackError::InvalidInput(format!("cannot read video {}: {e}", video.display()))
        })?;
        let body = TrackRequest {
            video_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            query_points: query,
        };

        let client = tokio::select! {
            _ = cancel.cancelled() => return Err(ProptrackError::Cancelled),
            client = self.connect() => client?,
        };

        let mut last_error = String::new();
        for attempt in 0..=self.config.max_retries {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ProptrackError::Cancelled),
                outcome = self.attempt(client, &body) => outcome,
            };
            match outcome {
                Ok(tracks) => {
                    debug!(tracks = tracks.len(), attempt = attempt + 1, "tracker responded");
                    return Ok(tracks);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(msg)) => {
                    if attempt < self.config.max_retries {
                        let delay = self.config.backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "tracker request failed, retrying: {}",
                            msg
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(ProptrackError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    last_error = msg;
                }
            }
        }

        Err(ProptrackError::TrackerUnavailable(format!(
            "gave up after {} attempts: {}",
            self.config.max_retries + 1,
            last_error
        )))
    }

    fn name(&self) -> &str {
        "remote"
    }
}
