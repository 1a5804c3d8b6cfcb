//! Planar surface tracking: four corner tracks turned into a per-frame
//! homography series.

use crate::homography::{solve, Homography};
use crate::point_tracker::{PointTracker, QueryPoint, Track, TrackedPoint};
use proptrack_core::{CancelToken, Point, ProptrackError, Quad, Rect, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CORNER_LABELS: [&str; 4] = ["corner_0", "corner_1", "corner_2", "corner_3"];
pub const CORNER_COLORS: [&str; 4] = ["#ff3b30", "#34c759", "#007aff", "#ffcc00"];

/// What to record for a frame whose tracked corners are degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// No transform; the frame is passed through unmodified.
    #[default]
    PassThrough,
    /// Substitute the nearest earlier frame's valid transform.
    ReusePrevious,
}

/// The transform for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomographyMatrix {
    pub frame_index: u32,
    /// Initial corners (frame 0).
    pub src_points: Quad,
    /// Tracked corners in this frame.
    pub dst_points: Quad,
    /// `None` when the corners were degenerate and nothing could stand in.
    pub matrix: Option<Homography>,
    /// Frame whose transform was substituted, if any.
    pub reused_from: Option<u32>,
}

impl HomographyMatrix {
    pub fn is_valid(&self) -> bool {
        self.matrix.is_some()
    }

    /// Where the prop should land in this frame.
    pub fn destination_quad(&self) -> Option<Quad> {
        let matrix = self.matrix.as_ref()?;
        if self.reused_from.is_some() {
            matrix.apply_quad(&self.src_points)
        } else {
            Some(self.dst_points)
        }
    }
}

/// Corner tracks plus the homography series derived from them.
///
/// Entry `f` of every corner track and of `homographies` describes frame `f`,
/// so `corner_tracks[i].len() == homographies.len()` for all four corners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanarTrack {
    pub video: PathBuf,
    pub corner_tracks: Vec<Track>,
    pub homographies: Vec<HomographyMatrix>,
    /// Union of every tracked corner position.
    pub bounding_box: Rect,
    /// Non-fatal problems found while building the track.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Rate the tracker sampled the video at, when it differs from the
    /// video's own.
    #[serde(default)]
    pub fps: Option<f64>,
}

impl PlanarTrack {
    pub fn frame_count(&self) -> usize {
        self.homographies.len()
    }

    pub fn get(&self, frame_index: usize) -> Option<&HomographyMatrix> {
        self.homographies.get(frame_index)
    }

    /// Destination quad for `frame_index`, or `None` if the frame has no
    /// usable transform.
    pub fn destination_quad(&self, frame_index: usize) -> Option<Quad> {
        self.get(frame_index)?.destination_quad()
    }

    pub fn valid_frames(&self) -> usize {
        self.homographies.iter().filter(|h| h.is_valid()).count()
    }

    /// Check that every corner track and the homography series hold exactly
    /// one entry per frame, in frame order.
    pub fn validate(&self) -> Result<()> {
        if self.corner_tracks.len() != 4 {
            return Err(ProptrackError::Internal(format!(
                "planar track has {} corner tracks",
                self.corner_tracks.len()
            )));
        }
        let n = self.homographies.len();
        if let Some(t) = self.corner_tracks.iter().find(|t| t.len() != n) {
            return Err(ProptrackError::Internal(format!(
                "corner track {} has {} points, expected {n}",
                t.label,
                t.len()
            )));
        }
        for f in 0..n {
            let frame = f as u32;
            let in_order = self.homographies[f].frame_index == frame
                && self
                    .corner_tracks
                    .iter()
                    .all(|t| t.points[f].frame_index == frame);
            if !in_order {
                return Err(ProptrackError::Internal(format!(
                    "planar track entries out of order at frame {f}"
                )));
            }
        }
        Ok(())
    }
}

/// Derives a [`PlanarTrack`] from four user-picked corners.
pub struct SurfaceTracker {
    tracker: Arc<dyn PointTracker>,
    policy: DegeneratePolicy,
}

impl SurfaceTracker {
    pub fn new(tracker: Arc<dyn PointTracker>) -> Self {
        Self {
            tracker,
            policy: DegeneratePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DegeneratePolicy {
        self.policy
    }

    /// Track the surface outlined by `initial_corners` in frame 0.
    pub async fn track_planar_surface(
        &self,
        video: &Path,
        initial_corners: &[Point],
        cancel: &CancelToken,
    ) -> Result<PlanarTrack> {
        let src = Quad::try_from_slice(initial_corners)?;
        if src.is_degenerate() {
            return Err(ProptrackError::InvalidInput(
                "initial corners are collinear or duplicated".into(),
            ));
        }
        let query = src.corners.map(QueryPoint::at_first_frame);
        debug!(tracker = self.tracker.name(), video = %video.display(), "requesting corner tracks");
        let tracks = self.tracker.track_points(video, &query, cancel).await?;
        let mut track = build_planar_track(video, src, tracks, self.policy, cancel)?;
        track.fps = self.tracker.sampling_fps();
        Ok(track)
    }
}

/// Assemble a [`PlanarTrack`] from raw corner tracks.
///
/// The series covers every frame up to the earliest last frame across the four
/// corners. A frame where some corner has no point, or where the corners are
/// degenerate, gets no transform of its own and is handled per `policy`.
/// Missing corners are filled with the last known position at zero
/// confidence so every corner track holds exactly one point per frame.
pub fn build_planar_track(
    video: &Path,
    src: Quad,
    mut tracks: Vec<Track>,
    policy: DegeneratePolicy,
    cancel: &CancelToken,
) -> Result<PlanarTrack> {
    if tracks.len() != 4 {
        return Err(ProptrackError::TrackerUnavailable(format!(
            "expected 4 corner tracks, tracker returned {}",
            tracks.len()
        )));
    }
    for (i, track) in tracks.iter_mut().enumerate() {
        if track.label.is_empty() {
            track.label = CORNER_LABELS[i].to_string();
        }
        if track.color.is_empty() {
            track.color = CORNER_COLORS[i].to_string();
        }
    }

    let mut warnings = Vec::new();
    let ends: Vec<usize> = tracks.iter().map(Track::frame_span).collect();
    let frames = ends.iter().copied().min().unwrap_or(0);
    if frames == 0 {
        return Err(ProptrackError::TrackerUnavailable(
            "tracker returned no usable frames".into(),
        ));
    }
    let longest = ends.iter().copied().max().unwrap_or(0);
    if longest != frames {
        warn!(
            frames,
            longest,
            ?ends,
            "corner tracks disagree in length, truncating planar track"
        );
        warnings.push(format!(
            "corner tracks truncated from {longest} to {frames} frames"
        ));
    }

    let mut homographies = Vec::with_capacity(frames);
    let mut last_valid: Option<(u32, Homography)> = None;
    let mut degenerate = 0usize;
    let mut missing = 0usize;
    let mut held = src.corners;
    let mut dense: [Vec<TrackedPoint>; 4] = Default::default();
    for f in 0..frames {
        cancel.check()?;
        let frame_index = f as u32;
        let mut complete = true;
        for (i, track) in tracks.iter().enumerate() {
            let point = match track.point_at(frame_index) {
                Some(p) => {
                    held[i] = p.position();
                    *p
                }
                None => {
                    complete = false;
                    TrackedPoint::new(held[i].x, held[i].y, frame_index, 0.0)
                }
            };
            dense[i].push(point);
        }
        let dst = Quad::new(held);

        let solved = if complete {
            match solve(&src, &dst) {
                Ok(h) => Some(h),
                Err(ProptrackError::DegenerateConfiguration(reason)) => {
                    degenerate += 1;
                    debug!(frame = frame_index, %reason, "degenerate corners");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            missing += 1;
            debug!(frame = frame_index, "corner missing from tracker output");
            None
        };
        let entry = match solved {
            Some(h) => {
                if h.is_near_degenerate() {
                    warn!(frame = frame_index, "homography is near-degenerate");
                }
                last_valid = Some((frame_index, h));
                HomographyMatrix {
                    frame_index,
                    src_points: src,
                    dst_points: dst,
                    matrix: Some(h),
                    reused_from: None,
                }
            }
            None => {
                let substitute = match policy {
                    DegeneratePolicy::PassThrough => None,
                    DegeneratePolicy::ReusePrevious => last_valid,
                };
                HomographyMatrix {
                    frame_index,
                    src_points: src,
                    dst_points: dst,
                    matrix: substitute.map(|(_, h)| h),
                    reused_from: substitute.map(|(i, _)| i),
                }
            }
        };
        homographies.push(entry);
    }
    for (track, points) in tracks.iter_mut().zip(dense) {
        track.points = points;
    }
    if missing > 0 {
        warn!(frames = missing, ?policy, "corner tracks have gaps");
        warnings.push(format!("{missing} frames had no data for every corner"));
    }
    if degenerate > 0 {
        warn!(frames = degenerate, ?policy, "degenerate corner configurations in planar track");
        warnings.push(format!("{degenerate} frames had degenerate corners"));
    }

    let bounding_box = Rect::bounding(
        tracks
            .iter()
            .flat_map(|t| t.points.iter().map(|p| p.position())),
    )
    .unwrap_or_default();

    let track = PlanarTrack {
        video: video.to_path_buf(),
        corner_tracks: tracks,
        homographies,
        bounding_box,
        warnings,
        fps: None,
    };
    track.validate()?;
    info!(
        frames = track.frame_count(),
        valid = track.valid_frames(),
        "planar track built"
    );
    Ok(track)
}
