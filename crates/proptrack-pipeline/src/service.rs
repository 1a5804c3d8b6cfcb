//! Request-level entry point: track the surface, then run the pipeline.

use crate::config::{PipelineConfig, TrackerBackend};
use crate::job::{CompositeJob, CompositeRequest, CompositeResult};
use crate::pipeline::VideoPipeline;
use crate::progress::ProgressFn;
use proptrack_composite::CompositeParams;
use proptrack_core::{CancelToken, FrameBuffer, Point, ProptrackError, Quad, Result};
use proptrack_media::{FfmpegTool, MediaTool};
use proptrack_tracking::{
    LucasKanadeTracker, PlanarTrack, PointTracker, RemoteTracker, SurfaceTracker,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Owns the tracker client and the pipeline; share it behind an `Arc`.
pub struct PropCompositor {
    surface: SurfaceTracker,
    pipeline: Arc<VideoPipeline>,
    tracker_timeout: Duration,
}

impl PropCompositor {
    pub fn new(tracker: Arc<dyn PointTracker>, pipeline: Arc<VideoPipeline>) -> Self {
        let config = pipeline.config();
        Self {
            surface: SurfaceTracker::new(tracker).with_policy(config.degenerate_policy),
            tracker_timeout: config.tracker_timeout(),
            pipeline,
        }
    }

    /// Build the FFmpeg media tool and the configured tracker backend.
    pub fn from_config(config: PipelineConfig) -> Self {
        let media: Arc<dyn MediaTool> = Arc::new(FfmpegTool::new(config.encoder.clone()));
        let tracker: Arc<dyn PointTracker> = match config.tracker_backend {
            TrackerBackend::Remote => Arc::new(RemoteTracker::new(config.tracker.clone())),
            TrackerBackend::Local => Arc::new(LucasKanadeTracker::new(
                Arc::clone(&media),
                config.local_tracker_config(),
            )),
        };
        Self::new(tracker, Arc::new(VideoPipeline::new(media, config)))
    }

    pub fn pipeline(&self) -> &Arc<VideoPipeline> {
        &self.pipeline
    }

    /// Track the quad outlined by `corners` through `video`, bounded by the
    /// configured tracker timeout.
    pub async fn track(
        &self,
        video: &Path,
        corners: &[Point],
        cancel: &CancelToken,
    ) -> Result<PlanarTrack> {
        let tracking = self.surface.track_planar_surface(video, corners, cancel);
        match tokio::time::timeout(self.tracker_timeout, tracking).await {
            Ok(result) => result,
            Err(_) => Err(ProptrackError::TrackerTimeout(self.tracker_timeout)),
        }
    }

    /// Serve one request end to end.
    pub async fn composite(&self, request: CompositeRequest, cancel: &CancelToken) -> CompositeResult {
        self.composite_with_progress(request, cancel, None).await
    }

    pub async fn composite_with_progress(
        &self,
        request: CompositeRequest,
        cancel: &CancelToken,
        progress: Option<Arc<ProgressFn>>,
    ) -> CompositeResult {
        let output = request.resolved_output_path();
        let job = match self.prepare(&request, output.clone(), cancel).await {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, video = %request.video_path.display(), "request failed before compositing");
                return CompositeResult::failure(output, &e);
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let cancel = cancel.clone();
        let run = tokio::task::spawn_blocking(move || {
            pipeline.run(&job, &cancel, progress.as_deref())
        });
        match run.await {
            Ok(result) => result,
            Err(e) => CompositeResult::failure(
                output,
                &ProptrackError::Internal(format!("pipeline task failed: {e}")),
            ),
        }
    }

    async fn prepare(
        &self,
        request: &CompositeRequest,
        output: PathBuf,
        cancel: &CancelToken,
    ) -> Result<CompositeJob> {
        Quad::try_from_slice(&request.corners)?;
        let params = request.params();
        params.validate()?;
        if !request.video_path.is_file() {
            return Err(ProptrackError::InvalidInput(format!(
                "video not found: {}",
                request.video_path.display()
            )));
        }
        if !request.prop_image_path.is_file() {
            return Err(ProptrackError::InvalidInput(format!(
                "prop image not found: {}",
                request.prop_image_path.display()
            )));
        }

        let track = self.track(&request.video_path, &request.corners, cancel).await?;
        info!(
            frames = track.frame_count(),
            valid = track.valid_frames(),
            "surface tracked"
        );
        let fps = track.fps;
        let mut job = CompositeJob::new(
            request.video_path.clone(),
            request.prop_image_path.clone(),
            track,
            output,
        )
        .with_params(params);
        if let Some(fps) = fps {
            job = job.with_fps(fps);
        }
        Ok(job)
    }

    /// Composite one frame without tracking or encoding.
    pub async fn preview(
        &self,
        video: &Path,
        prop_image: &Path,
        corners: &[Point],
        frame_index: usize,
        params: CompositeParams,
    ) -> Result<FrameBuffer> {
        let pipeline = Arc::clone(&self.pipeline);
        let video = video.to_path_buf();
        let prop_image = prop_image.to_path_buf();
        let corners = corners.to_vec();
        tokio::task::spawn_blocking(move || {
            pipeline.preview_frame(&video, &prop_image, &corners, frame_index, &params, None)
        })
        .await
        .map_err(|e| ProptrackError::Internal(format!("preview task failed: {e}")))?
    }
}
