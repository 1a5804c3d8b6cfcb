//! The Video Pipeline: extract, composite every frame, re-encode.
//!
//! ```text
//! Init -> Extracting -> Compositing -> Assembling -> Done
//!   \________\______________\_____________\-------> Failed
//! ```
//!
//! All intermediate files live in one per-job scratch directory that is
//! removed when the run returns, whatever the outcome. The encoder writes
//! into that directory too; only a finished file is moved to the output
//! path.

use crate::config::PipelineConfig;
use crate::job::{CompositeJob, CompositeResult, TrackGeometry};
use crate::progress::{PipelineProgress, PipelineStage};
use proptrack_composite::{composite_into, warp, CompositeParams, WarpMethod};
use proptrack_core::{frame_file_name, CancelToken, FrameBuffer, Point, ProptrackError, Quad, Result};
use proptrack_media::{list_frames, MediaTool};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Composited,
    PassedThrough,
}

/// Runs composite jobs against a [`MediaTool`].
pub struct VideoPipeline {
    media: Arc<dyn MediaTool>,
    config: PipelineConfig,
}

impl VideoPipeline {
    pub fn new(media: Arc<dyn MediaTool>, config: PipelineConfig) -> Self {
        Self { media, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn media(&self) -> &Arc<dyn MediaTool> {
        &self.media
    }

    /// Run `job` to completion. Never panics on bad input and never returns
    /// an error: failures are reported in the [`CompositeResult`].
    pub fn run(
        &self,
        job: &CompositeJob,
        cancel: &CancelToken,
        progress: Option<&(dyn Fn(PipelineProgress) + Send + Sync + '_)>,
    ) -> CompositeResult {
        let job_id = Uuid::new_v4();
        let span = info_span!("composite_job", %job_id);
        let _guard = span.enter();
        let started = Instant::now();
        let report = |p: PipelineProgress| {
            if let Some(cb) = progress {
                cb(p);
            }
        };

        info!(
            video = %job.video_path.display(),
            output = %job.output_path.display(),
            "composite job started"
        );
        match self.execute(job_id, job, cancel, &report) {
            Ok(result) => {
                report(PipelineProgress::new(
                    PipelineStage::Done,
                    result.frame_count,
                    result.frame_count,
                ));
                info!(
                    frames = result.frame_count,
                    composited = result.frames_composited,
                    passed_through = result.frames_passed_through,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "composite job finished"
                );
                result
            }
            Err(e) => {
                error!(error = %e, "composite job failed");
                report(PipelineProgress::new(PipelineStage::Failed, 0, 0));
                CompositeResult::failure(&job.output_path, &e)
            }
        }
    }

    fn execute(
        &self,
        job_id: Uuid,
        job: &CompositeJob,
        cancel: &CancelToken,
        report: &(dyn Fn(PipelineProgress) + Sync),
    ) -> Result<CompositeResult> {
        // Init
        report(PipelineProgress::new(PipelineStage::Init, 0, 0));
        job.params.validate()?;
        if !job.video_path.is_file() {
            return Err(ProptrackError::InvalidInput(format!(
                "video not found: {}",
                job.video_path.display()
            )));
        }
        let prop = FrameBuffer::load(&job.prop_image_path)?;
        let scratch = Scratch::create(&self.config.scratch_dir(), job_id)?;
        let info = self.media.probe(&job.video_path)?;
        let fps = job.fps.unwrap_or(info.fps);
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ProptrackError::InvalidInput(format!("invalid frame rate {fps}")));
        }

        // Extracting
        cancel.check()?;
        report(PipelineProgress::new(PipelineStage::Extracting, 0, 0));
        info!(fps, stage = "extracting", "extracting frames");
        self.media
            .extract_frames(&job.video_path, &scratch.extracted, fps)?;
        let frames = list_frames(&scratch.extracted)?;
        if frames.is_empty() {
            return Err(ProptrackError::InvalidInput(format!(
                "no frames decoded from {}",
                job.video_path.display()
            )));
        }
        if frames.len() != job.geometry.frame_count() {
            debug!(
                extracted = frames.len(),
                tracked = job.geometry.frame_count(),
                "frame count differs from tracked frame count"
            );
        }

        // Compositing
        let total = frames.len();
        report(PipelineProgress::new(PipelineStage::Compositing, 0, total));
        info!(frames = total, workers = self.config.worker_count(), stage = "compositing", "compositing frames");
        let outcomes = self.composite_all(&frames, &scratch.composited, &prop, job, cancel, report)?;
        let composited = outcomes
            .iter()
            .filter(|o| **o == FrameOutcome::Composited)
            .count();

        // Assembling
        cancel.check()?;
        report(PipelineProgress::new(PipelineStage::Assembling, total, total));
        info!(stage = "assembling", has_audio = info.has_audio, "encoding output");
        let staged = scratch.root().join(staged_name(&job.output_path));
        let audio = info.has_audio.then_some(job.video_path.as_path());
        self.media
            .encode(&scratch.composited, fps, audio, &staged)?;
        place_output(&staged, &job.output_path)?;

        Ok(CompositeResult {
            success: true,
            output_path: job.output_path.clone(),
            frame_count: total,
            duration_seconds: total as f64 / fps,
            error: None,
            frames_composited: composited,
            frames_passed_through: total - composited,
        })
    }

    /// Process every frame on a bounded worker pool. Output order is
    /// recovered from file names, so workers never coordinate.
    fn composite_all(
        &self,
        frames: &[(usize, PathBuf)],
        out_dir: &Path,
        prop: &FrameBuffer,
        job: &CompositeJob,
        cancel: &CancelToken,
        report: &(dyn Fn(PipelineProgress) + Sync),
    ) -> Result<Vec<FrameOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .thread_name(|i| format!("proptrack-worker-{i}"))
            .build()
            .map_err(|e| ProptrackError::Internal(format!("worker pool: {e}")))?;
        let done = AtomicUsize::new(0);
        let total = frames.len();
        let method = self.config.warp_method;

        pool.install(|| {
            frames
                .par_iter()
                .map(|(index, path)| {
                    cancel.check()?;
                    let out = out_dir.join(frame_file_name(*index));
                    let outcome = render_frame(
                        *index,
                        path,
                        &out,
                        prop,
                        &job.geometry,
                        &job.params,
                        method,
                    )?;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    report(PipelineProgress::new(PipelineStage::Compositing, n, total));
                    Ok(outcome)
                })
                .collect()
        })
    }

    /// Composite a single frame for interactive preview.
    ///
    /// Only the requested frame is decoded; nothing is encoded.
    pub fn preview_frame(
        &self,
        video: &Path,
        prop_image: &Path,
        corners: &[Point],
        frame_index: usize,
        params: &CompositeParams,
        fps: Option<f64>,
    ) -> Result<FrameBuffer> {
        let quad = Quad::try_from_slice(corners)?;
        params.validate()?;
        if !video.is_file() {
            return Err(ProptrackError::InvalidInput(format!(
                "video not found: {}",
                video.display()
            )));
        }
        let prop = FrameBuffer::load(prop_image)?;
        let fps = match fps {
            Some(fps) => fps,
            None => self.media.probe(video)?.fps,
        };
        let scratch = tempfile::Builder::new()
            .prefix("proptrack-preview-")
            .tempdir_in(ensure_dir(&self.config.scratch_dir())?)?;
        let frame_path = scratch.path().join(frame_file_name(frame_index));
        self.media.extract_frame(video, frame_index, fps, &frame_path)?;
        let mut frame = FrameBuffer::load(&frame_path)?;
        let warped = warp(&prop, &quad, frame.dimensions(), self.config.warp_method)?;
        composite_into(&mut frame, &warped, params)?;
        Ok(frame)
    }
}

/// Warp and blend one frame, or copy it unchanged when there is nothing to
/// place on it.
fn render_frame(
    index: usize,
    src: &Path,
    out: &Path,
    prop: &FrameBuffer,
    geometry: &TrackGeometry,
    params: &CompositeParams,
    method: WarpMethod,
) -> Result<FrameOutcome> {
    let Some(quad) = geometry.destination_quad(index) else {
        fs::copy(src, out)?;
        return Ok(FrameOutcome::PassedThrough);
    };
    let mut frame = FrameBuffer::load(src)?;
    let warped = match warp(prop, &quad, frame.dimensions(), method) {
        Ok(warped) => warped,
        Err(e) if e.is_frame_recoverable() => {
            warn!(frame = index, error = %e, "skipping frame");
            fs::copy(src, out)?;
            return Ok(FrameOutcome::PassedThrough);
        }
        Err(e) => return Err(e),
    };
    if warped.is_empty() {
        debug!(frame = index, "prop outside frame");
        fs::copy(src, out)?;
        return Ok(FrameOutcome::PassedThrough);
    }
    composite_into(&mut frame, &warped, params)?;
    frame.save_png(out)?;
    Ok(FrameOutcome::Composited)
}

/// Per-job scratch space; removed on drop.
struct Scratch {
    dir: tempfile::TempDir,
    extracted: PathBuf,
    composited: PathBuf,
}

impl Scratch {
    fn create(root: &Path, job_id: Uuid) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("proptrack-{job_id}-"))
            .tempdir_in(ensure_dir(root)?)?;
        let extracted = dir.path().join("extracted");
        let composited = dir.path().join("composited");
        fs::create_dir(&extracted)?;
        fs::create_dir(&composited)?;
        debug!(scratch = %dir.path().display(), "scratch directory created");
        Ok(Self {
            dir,
            extracted,
            composited,
        })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn ensure_dir(dir: &Path) -> Result<&Path> {
    fs::create_dir_all(dir)?;
    Ok(dir)
}

fn staged_name(output: &Path) -> String {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    format!("output.{ext}")
}

/// Move a finished file into place. Falls back to copy-then-rename when the
/// scratch directory is on another filesystem.
fn place_output(staged: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(staged, output).is_ok() {
        return Ok(());
    }
    let partial = output.with_extension("partial");
    let copied = fs::copy(staged, &partial).and_then(|_| fs::rename(&partial, output));
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}
