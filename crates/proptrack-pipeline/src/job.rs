//! Job input and result contracts.

use proptrack_composite::{BlendMode, CompositeParams};
use proptrack_core::{Point, ProptrackError, Quad};
use proptrack_tracking::PlanarTrack;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-frame placement of the prop.
#[derive(Debug, Clone)]
pub enum TrackGeometry {
    /// Output of the surface tracker.
    Planar(PlanarTrack),
    /// Destination quads indexed by frame; `None` passes the frame through.
    Quads(Vec<Option<Quad>>),
}

impl TrackGeometry {
    /// Where the prop goes in `frame_index`, if anywhere.
    pub fn destination_quad(&self, frame_index: usize) -> Option<Quad> {
        match self {
            Self::Planar(track) => track.destination_quad(frame_index),
            Self::Quads(quads) => quads.get(frame_index).copied().flatten(),
        }
    }

    /// Number of frames with an entry (valid or not).
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Planar(track) => track.frame_count(),
            Self::Quads(quads) => quads.len(),
        }
    }
}

impl From<PlanarTrack> for TrackGeometry {
    fn from(track: PlanarTrack) -> Self {
        Self::Planar(track)
    }
}

/// Everything one pipeline run needs.
#[derive(Debug, Clone)]
pub struct CompositeJob {
    pub video_path: PathBuf,
    pub prop_image_path: PathBuf,
    pub geometry: TrackGeometry,
    pub params: CompositeParams,
    pub output_path: PathBuf,
    /// Decode rate; the probed source rate when unset.
    pub fps: Option<f64>,
}

impl CompositeJob {
    pub fn new(
        video_path: impl Into<PathBuf>,
        prop_image_path: impl Into<PathBuf>,
        geometry: impl Into<TrackGeometry>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            prop_image_path: prop_image_path.into(),
            geometry: geometry.into(),
            params: CompositeParams::default(),
            output_path: output_path.into(),
            fps: None,
        }
    }

    pub fn with_params(mut self, params: CompositeParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }
}

/// Terminal outcome of a job; produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResult {
    pub success: bool,
    pub output_path: PathBuf,
    pub frame_count: usize,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub frames_composited: usize,
    #[serde(default)]
    pub frames_passed_through: usize,
}

impl CompositeResult {
    pub fn failure(output_path: impl Into<PathBuf>, error: &ProptrackError) -> Self {
        Self {
            success: false,
            output_path: output_path.into(),
            frame_count: 0,
            duration_seconds: 0.0,
            error: Some(error.to_string()),
            frames_composited: 0,
            frames_passed_through: 0,
        }
    }
}

/// Caller-facing request; tracking happens before a [`CompositeJob`] exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRequest {
    pub video_path: PathBuf,
    pub prop_image_path: PathBuf,
    pub corners: Vec<Point>,
    #[serde(default)]
    pub blend_mode: Option<BlendMode>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub feather_edge: Option<f32>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl CompositeRequest {
    pub fn new(
        video_path: impl Into<PathBuf>,
        prop_image_path: impl Into<PathBuf>,
        corners: Vec<Point>,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            prop_image_path: prop_image_path.into(),
            corners,
            blend_mode: None,
            opacity: None,
            feather_edge: None,
            output_path: None,
        }
    }

    pub fn params(&self) -> CompositeParams {
        let defaults = CompositeParams::default();
        CompositeParams {
            opacity: self.opacity.unwrap_or(defaults.opacity),
            blend_mode: self.blend_mode.unwrap_or(defaults.blend_mode),
            feather_radius: self.feather_edge.unwrap_or(defaults.feather_radius),
        }
    }

    /// Explicit output path, or `<stem>_composited.mp4` next to the video.
    pub fn resolved_output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| default_output_path(&self.video_path))
    }
}

pub fn default_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{stem}_composited.mp4"))
}
