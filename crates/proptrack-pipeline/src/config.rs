//! Pipeline configuration: defaults, JSON files and `PROPTRACK_*` overrides.

use proptrack_composite::WarpMethod;
use proptrack_core::{ProptrackError, Result};
use proptrack_media::EncoderConfig;
use proptrack_tracking::{DegeneratePolicy, LocalTrackerConfig, TrackerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which [`proptrack_tracking::PointTracker`] the service builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    #[default]
    Remote,
    Local,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent of per-job scratch directories (system temp dir when unset).
    pub scratch_root: Option<PathBuf>,
    /// Compositing worker count (CPU count when unset).
    pub worker_threads: Option<usize>,
    pub warp_method: WarpMethod,
    pub degenerate_policy: DegeneratePolicy,
    pub tracker_backend: TrackerBackend,
    /// Overall deadline for the tracking call, in milliseconds.
    pub tracker_timeout_ms: u64,
    pub tracker: TrackerConfig,
    pub local_tracker: LocalTrackerConfig,
    pub encoder: EncoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            worker_threads: None,
            warp_method: WarpMethod::default(),
            degenerate_policy: DegeneratePolicy::default(),
            tracker_backend: TrackerBackend::default(),
            tracker_timeout_ms: 600_000,
            tracker: TrackerConfig::default(),
            local_tracker: LocalTrackerConfig::default(),
            encoder: EncoderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a JSON document; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            ProptrackError::InvalidInput(format!("cannot read config {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Overlay `PROPTRACK_*` values produced by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("PROPTRACK_SCRATCH_DIR") {
            self.scratch_root = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PROPTRACK_WORKERS") {
            self.worker_threads = Some(parse_var("PROPTRACK_WORKERS", &v)?);
        }
        if let Some(v) = lookup("PROPTRACK_WARP_METHOD") {
            self.warp_method = v.parse()?;
        }
        if let Some(v) = lookup("PROPTRACK_TRACKER") {
            self.tracker_backend = match v.trim().to_ascii_lowercase().as_str() {
                "remote" => TrackerBackend::Remote,
                "local" => TrackerBackend::Local,
                other => {
                    return Err(ProptrackError::InvalidInput(format!(
                        "PROPTRACK_TRACKER must be 'remote' or 'local', got '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = lookup("PROPTRACK_TRACKER_URL") {
            self.tracker.base_url = v;
        }
        if let Some(v) = lookup("PROPTRACK_TRACKER_TIMEOUT_MS") {
            self.tracker_timeout_ms = parse_var("PROPTRACK_TRACKER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PROPTRACK_TRACKER_RETRIES") {
            self.tracker.max_retries = parse_var("PROPTRACK_TRACKER_RETRIES", &v)?;
        }
        if let Some(v) = lookup("PROPTRACK_FFMPEG") {
            self.encoder.ffmpeg_binary = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PROPTRACK_FFPROBE") {
            self.encoder.ffprobe_binary = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Local tracker settings; frame extraction shares the job scratch root
    /// unless the tracker names its own.
    pub fn local_tracker_config(&self) -> LocalTrackerConfig {
        let mut local = self.local_tracker.clone();
        if local.scratch_root.is_none() {
            local.scratch_root = self.scratch_root.clone();
        }
        local
    }

    pub fn worker_count(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_millis(self.tracker_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProptrackError::InvalidInput(format!("invalid value for {key}: '{value}'")))
}
