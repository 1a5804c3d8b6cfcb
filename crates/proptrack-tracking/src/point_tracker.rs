//! The Point Tracker collaborator: per-frame positions for arbitrary query points.

use async_trait::async_trait;
use proptrack_core::{CancelToken, Point, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One tracked position in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "frameIndex")]
    pub frame_index: u32,
    /// Informational only; never gates compositing.
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl TrackedPoint {
    pub fn new(x: f64, y: f64, frame_index: u32, confidence: f32) -> Self {
        Self {
            x,
            y,
            frame_index,
            confidence,
        }
    }

    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A point to follow, anchored at `frame_index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryPoint {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "frameIndex", alias = "frame_index")]
    pub frame_index: u32,
}

impl QueryPoint {
    pub fn at_first_frame(p: Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
            frame_index: 0,
        }
    }
}

/// The positions of one query point over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub color: String,
    pub points: Vec<TrackedPoint>,
}

impl Track {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// One past the highest frame index in the track, or 0 when empty.
    pub fn frame_span(&self) -> usize {
        self.points
            .iter()
            .map(|p| p.frame_index as usize + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn point_at(&self, frame_index: u32) -> Option<&TrackedPoint> {
        self.points
            .get(frame_index as usize)
            .filter(|p| p.frame_index == frame_index)
            .or_else(|| self.points.iter().find(|p| p.frame_index == frame_index))
    }
}

/// External service that follows query points through a video.
///
/// One [`Track`] is returned per query point, in query order. Tracks may end
/// early when a point is lost; callers must not assume full length.
#[async_trait]
pub trait PointTracker: Send + Sync {
    async fn track_points(
        &self,
        video: &Path,
        query: &[QueryPoint],
        cancel: &CancelToken,
    ) -> Result<Vec<Track>>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "point-tracker"
    }

    /// Frame rate the returned tracks are indexed at, if not the video's own.
    fn sampling_fps(&self) -> Option<f64> {
        None
    }
}
