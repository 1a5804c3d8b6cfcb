//! Pyramidal Lucas-Kanade point tracker running on extracted frames.
//!
//! Used when no remote tracking service is configured. Frames are decoded
//! through the [`MediaTool`] into a private temporary directory and streamed
//! pairwise, so only two pyramids are resident at a time.

use crate::point_tracker::{PointTracker, QueryPoint, Track, TrackedPoint};
use crate::pyramid::{GrayImage, ImagePyramid};
use async_trait::async_trait;
use proptrack_core::{CancelToken, FrameBuffer, Point, ProptrackError, Result};
use proptrack_media::{list_frames, MediaTool};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Tuning for the local tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTrackerConfig {
    /// Side of the square integration window, in pixels.
    pub window_size: u32,
    pub pyramid_levels: u32,
    pub max_iterations: u32,
    /// Convergence threshold on the per-iteration update, in pixels.
    pub epsilon: f32,
    /// Largest plausible motion between consecutive frames; beyond it the
    /// point is considered lost.
    pub max_step: f32,
    /// Frame rate to sample at; the probed rate when unset.
    pub fps: Option<f64>,
    /// Parent of the per-call frame directory; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for LocalTrackerConfig {
    fn default() -> Self {
        Self {
            window_size: 21,
            pyramid_levels: 3,
            max_iterations: 30,
            epsilon: 0.01,
            max_step: 48.0,
            fps: None,
            scratch_root: None,
        }
    }
}

/// Local [`PointTracker`] implementation.
pub struct LucasKanadeTracker {
    media: Arc<dyn MediaTool>,
    config: LocalTrackerConfig,
}

impl LucasKanadeTracker {
    pub fn new(media: Arc<dyn MediaTool>, config: LocalTrackerConfig) -> Self {
        Self { media, config }
    }

    pub fn config(&self) -> &LocalTrackerConfig {
        &self.config
    }
}

#[async_trait]
impl PointTracker for LucasKanadeTracker {
    async fn track_points(
        &self,
        video: &Path,
        query: &[QueryPoint],
        cancel: &CancelToken,
    ) -> Result<Vec<Track>> {
        let media = Arc::clone(&self.media);
        let config = self.config.clone();
        let video: PathBuf = video.to_path_buf();
        let query = query.to_vec();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || track_video(media.as_ref(), &config, &video, &query, &cancel))
            .await
            .map_err(|e| ProptrackError::Internal(format!("local tracker task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "lucas-kanade"
    }

    fn sampling_fps(&self) -> Option<f64> {
        self.config.fps
    }
}

/// Per-query tracking state.
enum PointState {
    Pending,
    Active(Point),
    Lost,
}

fn track_video(
    media: &dyn MediaTool,
    config: &LocalTrackerConfig,
    video: &Path,
    query: &[QueryPoint],
    cancel: &CancelToken,
) -> Result<Vec<Track>> {
    let fps = match config.fps {
        Some(fps) => fps,
        None => media.probe(video)?.fps,
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix("proptrack-lk-");
    let scratch = match &config.scratch_root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };
    debug!(dir = %scratch.path().display(), "local tracker scratch");
    media.extract_frames(video, scratch.path(), fps)?;
    let frames = list_frames(scratch.path())?;
    info!(frames = frames.len(), points = query.len(), fps, "local tracking started");

    let mut tracks: Vec<Track> = (0..query.len())
        .map(|i| Track::new(format!("point_{i}"), ""))
        .collect();
    let mut states: Vec<PointState> = query.iter().map(|_| PointState::Pending).collect();
    let mut prev: Option<ImagePyramid> = None;

    for (frame_index, path) in frames {
        cancel.check()?;
        let frame_index = frame_index as u32;
        let gray = GrayImage::from_frame(&FrameBuffer::load(&path)?);
        let curr = ImagePyramid::build(gray, config.pyramid_levels, config.window_size);

        for ((q, state), track) in query.iter().zip(states.iter_mut()).zip(tracks.iter_mut()) {
            match state {
                PointState::Pending if q.frame_index == frame_index => {
                    let p = Point::new(q.x, q.y);
                    track.points.push(TrackedPoint::new(p.x, p.y, frame_index, 1.0));
                    *state = PointState::Active(p);
                }
                PointState::Active(p) => {
                    let tracked = prev
                        .as_ref()
                        .and_then(|prev| track_point(prev, &curr, *p, config));
                    match tracked {
                        Some((next, confidence)) => {
                            track.points.push(TrackedPoint::new(next.x, next.y, frame_index, confidence));
                            *state = PointState::Active(next);
                        }
                        None => {
                            debug!(frame = frame_index, label = %track.label, "point lost");
                            *state = PointState::Lost;
                        }
                    }
                }
                _ => {}
            }
        }

        if states.iter().all(|s| matches!(s, PointState::Lost)) {
            break;
        }
        prev = Some(curr);
    }

    Ok(tracks)
}

/// Track one point from `prev` to `curr`; returns the new position and a
/// confidence in `[0, 1]`, or `None` when the point is lost.
pub fn track_point(
    prev: &ImagePyramid,
    curr: &ImagePyramid,
    position: Point,
    config: &LocalTrackerConfig,
) -> Option<(Point, f32)> {
    let levels = prev.depth().min(curr.depth());
    let hw = (config.window_size / 2) as i32;
    let mut guess = (0.0f32, 0.0f32);
    let mut residual = 0.0f32;

    for level in (0..levels).rev() {
        let scale = 1.0 / (1u32 << level) as f32;
        let px = position.x as f32 * scale;
        let py = position.y as f32 * scale;
        let prev_img = &prev.levels[level];
        let curr_img = &curr.levels[level];

        let mut g11 = 0.0f32;
        let mut g12 = 0.0f32;
        let mut g22 = 0.0f32;
        for wy in -hw..=hw {
            for wx in -hw..=hw {
                let (ix, iy) = prev_img.gradient(px + wx as f32, py + wy as f32);
                g11 += ix * ix;
                g12 += ix * iy;
                g22 += iy * iy;
            }
        }
        let det = g11 * g22 - g12 * g12;
        if det.abs() < 1e-6 {
            if level == 0 {
                return None;
            }
            guess = (guess.0 * 2.0, guess.1 * 2.0);
            continue;
        }
        let inv_det = 1.0 / det;

        let (mut dx, mut dy) = guess;
        for _ in 0..config.max_iterations {
            let mut bx = 0.0f32;
            let mut by = 0.0f32;
            residual = 0.0;
            for wy in -hw..=hw {
                for wx in -hw..=hw {
                    let sx = px + wx as f32;
                    let sy = py + wy as f32;
                    let (ix, iy) = prev_img.gradient(sx, sy);
                    let it = curr_img.sample(sx + dx, sy + dy) - prev_img.sample(sx, sy);
                    bx += ix * it;
                    by += iy * it;
                    residual += it.abs();
                }
            }
            let ddx = inv_det * (g22 * bx - g12 * by);
            let ddy = inv_det * (-g12 * bx + g11 * by);
            dx -= ddx;
            dy -= ddy;
            if ddx * ddx + ddy * ddy < config.epsilon * config.epsilon {
                break;
            }
        }
        guess = if level > 0 { (dx * 2.0, dy * 2.0) } else { (dx, dy) };
    }

    if !guess.0.is_finite() || !guess.1.is_finite() {
        return None;
    }
    if (guess.0 * guess.0 + guess.1 * guess.1).sqrt() > config.max_step {
        return None;
    }
    let next = Point::new(position.x + guess.0 as f64, position.y + guess.1 as f64);
    if !curr.base().in_bounds(next.x as f32, next.y as f32) {
        return None;
    }
    let window_area = ((2 * hw + 1) * (2 * hw + 1)) as f32;
    let confidence = (1.0 - 4.0 * residual / window_area).clamp(0.0, 1.0);
    Some((next, confidence))
}
