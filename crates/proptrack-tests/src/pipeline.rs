//! Integration tests for the video pipeline.
//!
//! Exercises proptrack-pipeline against proptrack-composite and
//! proptrack-tracking with an in-memory media tool.

use crate::fakes::{dir_entries, moving_tracks, shaded_frames, write_png, write_video, FakeMedia};
use parking_lot::Mutex;
use proptrack_composite::{BlendMode, CompositeParams, WarpMethod};
use proptrack_core::{CancelToken, FrameBuffer, Point, Quad};
use proptrack_pipeline::{
    CompositeJob, PipelineConfig, PipelineProgress, PipelineStage, TrackGeometry, VideoPipeline,
};
use proptrack_tracking::{build_planar_track, DegeneratePolicy};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ── Helpers ────────────────────────────────────────────────────

struct Harness {
    work: TempDir,
    scratch: TempDir,
    media: Arc<FakeMedia>,
    pipeline: VideoPipeline,
}

impl Harness {
    fn new(media: FakeMedia) -> Self {
        Self::with_method(media, WarpMethod::Perspective)
    }

    fn with_method(media: FakeMedia, warp_method: WarpMethod) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            scratch_root: Some(scratch.path().to_path_buf()),
            worker_threads: Some(2),
            warp_method,
            ..Default::default()
        };
        let media = Arc::new(media);
        let pipeline = VideoPipeline::new(media.clone(), config);
        Self {
            work: tempfile::tempdir().unwrap(),
            scratch,
            media,
            pipeline,
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.work.path().join(name)
    }

    fn job(&self, geometry: TrackGeometry) -> CompositeJob {
        let video = write_video(self.work.path(), "clip.mp4");
        let prop = write_png(
            self.work.path(),
            "prop.png",
            &FrameBuffer::filled(16, 16, [255, 0, 0, 255]),
        );
        CompositeJob::new(video, prop, geometry, self.path("out/result.mp4"))
    }

    fn scratch_is_empty(&self) -> bool {
        dir_entries(self.scratch.path()) == 0
    }
}

fn center_quad() -> Quad {
    Quad::from_size(20.0, 20.0).offset(Point::new(20.0, 10.0))
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn three_frame_job_at_one_fps() {
    let h = Harness::new(FakeMedia::new(shaded_frames(3, 64, 48), 1.0));
    let job = h
        .job(TrackGeometry::Quads(vec![Some(center_quad()); 3]))
        .with_params(CompositeParams {
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            feather_radius: 0.0,
        });

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.frame_count, 3);
    assert_eq!(result.duration_seconds, 3.0);
    assert_eq!(result.frames_composited, 3);
    assert_eq!(result.frames_passed_through, 0);
    assert!(result.error.is_none());
    assert_eq!(read(&result.output_path), b"FAKEMP4");

    let frame = FrameBuffer::load(h.media.encoded_frame(1)).unwrap();
    assert_eq!(frame.pixel(30, 20), [255, 0, 0, 255]);
    assert_eq!(frame.pixel(2, 2), shaded_frames(3, 64, 48)[1].pixel(2, 2));
    assert!(h.scratch_is_empty());
}

#[test]
fn frame_without_track_data_passes_through_unchanged() {
    let h = Harness::new(FakeMedia::new(shaded_frames(10, 64, 48), 24.0));
    let corners = center_quad().corners;
    let mut track = build_planar_track(
        Path::new("clip.mp4"),
        Quad::new(corners),
        moving_tracks(&corners, Point::new(1.0, 0.5), [10; 4]),
        DegeneratePolicy::PassThrough,
        &CancelToken::new(),
    )
    .unwrap();
    track.homographies[7].matrix = None;
    let job = h.job(TrackGeometry::Planar(track));

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.frames_passed_through, 1);
    assert_eq!(read(&h.media.encoded_frame(7)), read(&h.media.extracted_frame(7)));
    assert_ne!(read(&h.media.encoded_frame(6)), read(&h.media.extracted_frame(6)));
}

#[test]
fn frames_beyond_track_pass_through() {
    let h = Harness::new(FakeMedia::new(shaded_frames(5, 32, 32), 5.0));
    let quad = Quad::from_size(10.0, 10.0);
    let job = h.job(TrackGeometry::Quads(vec![Some(quad), Some(quad)]));

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(result.success);
    assert_eq!(result.frame_count, 5);
    assert_eq!(result.frames_composited, 2);
    for i in 2..5 {
        assert_eq!(read(&h.media.encoded_frame(i)), read(&h.media.extracted_frame(i)));
    }
}

#[test]
fn square_prop_on_identity_quad_is_reproduced() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 100, 100), 1.0));
    let mut prop = FrameBuffer::new(100, 100);
    for y in 0..100 {
        for x in 0..100 {
            prop.set_pixel(x, y, [x as u8 * 2, y as u8 * 2, (x * y % 256) as u8, 255]);
        }
    }
    let video = write_video(h.work.path(), "clip.mp4");
    let prop_path = write_png(h.work.path(), "square.png", &prop);
    let identity = Quad::new([
        Point::new(0.0, 0.0),
        Point::new(100.0, 0.0),
        Point::new(100.0, 100.0),
        Point::new(0.0, 100.0),
    ]);
    let job = CompositeJob::new(
        video,
        prop_path,
        TrackGeometry::Quads(vec![Some(identity)]),
        h.path("square.mp4"),
    );

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(FrameBuffer::load(h.media.encoded_frame(0)).unwrap(), prop);
}

#[test]
fn triangulated_warp_runs_end_to_end() {
    let h = Harness::with_method(
        FakeMedia::new(shaded_frames(2, 64, 48), 2.0),
        WarpMethod::Triangulated,
    );
    let job = h.job(TrackGeometry::Quads(vec![Some(center_quad()); 2]));
    let result = h.pipeline.run(&job, &CancelToken::new(), None);
    assert!(result.success);
    let frame = FrameBuffer::load(h.media.encoded_frame(0)).unwrap();
    assert_eq!(frame.pixel(30, 20), [255, 0, 0, 255]);
}

#[test]
fn source_audio_is_passed_to_encoder() {
    let h = Harness::new(FakeMedia::new(shaded_frames(2, 16, 16), 30.0).with_audio());
    let job = h.job(TrackGeometry::Quads(vec![]));

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(result.success);
    let encodes = h.media.encodes();
    assert_eq!(encodes.len(), 1);
    assert_eq!(encodes[0].audio.as_deref(), Some(job.video_path.as_path()));
    assert_eq!(encodes[0].fps, 30.0);
    assert_eq!(encodes[0].frames, 2);
}

#[test]
fn video_only_source_encodes_without_audio() {
    let h = Harness::new(FakeMedia::new(shaded_frames(2, 16, 16), 30.0));
    let job = h.job(TrackGeometry::Quads(vec![]));
    assert!(h.pipeline.run(&job, &CancelToken::new(), None).success);
    assert!(h.media.encodes()[0].audio.is_none());
}

#[test]
fn explicit_fps_overrides_probe() {
    let h = Harness::new(FakeMedia::new(shaded_frames(4, 16, 16), 30.0));
    let job = h.job(TrackGeometry::Quads(vec![])).with_fps(2.0);
    let result = h.pipeline.run(&job, &CancelToken::new(), None);
    assert_eq!(result.duration_seconds, 2.0);
    assert_eq!(h.media.encodes()[0].fps, 2.0);
}

// ── Failure containment & cleanup ──────────────────────────────

#[test]
fn corrupt_video_fails_and_cleans_up() {
    let h = Harness::new(FakeMedia::new(shaded_frames(3, 16, 16), 1.0));
    let mut job = h.job(TrackGeometry::Quads(vec![]));
    fs::write(&job.video_path, b"\x00\x01garbage").unwrap();
    job.output_path = h.path("corrupt.mp4");

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("ffprobe"));
    assert!(!job.output_path.exists());
    assert!(h.scratch_is_empty());
}

#[test]
fn encoder_failure_leaves_no_output() {
    let h = Harness::new(FakeMedia::new(shaded_frames(3, 16, 16), 1.0).failing_encode());
    let job = h.job(TrackGeometry::Quads(vec![Some(Quad::from_size(8.0, 8.0)); 3]));

    let result = h.pipeline.run(&job, &CancelToken::new(), None);

    assert!(!result.success);
    assert!(!job.output_path.exists());
    assert!(h.scratch_is_empty());
}

#[test]
fn missing_video_is_invalid_input() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 16, 16), 1.0));
    let mut job = h.job(TrackGeometry::Quads(vec![]));
    job.video_path = h.path("nope.mp4");
    let result = h.pipeline.run(&job, &CancelToken::new(), None);
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Invalid input"));
    assert!(h.scratch_is_empty());
}

#[test]
fn undecodable_prop_is_invalid_input() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 16, 16), 1.0));
    let job = h.job(TrackGeometry::Quads(vec![]));
    fs::write(&job.prop_image_path, b"not a png").unwrap();
    let result = h.pipeline.run(&job, &CancelToken::new(), None);
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Invalid input"));
}

#[test]
fn out_of_range_opacity_rejected() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 16, 16), 1.0));
    let job = h.job(TrackGeometry::Quads(vec![])).with_params(CompositeParams {
        opacity: 1.2,
        ..Default::default()
    });
    let result = h.pipeline.run(&job, &CancelToken::new(), None);
    assert!(!result.success);
    assert!(h.media.encodes().is_empty());
}

#[test]
fn cancelled_job_fails_without_output() {
    let h = Harness::new(FakeMedia::new(shaded_frames(4, 16, 16), 1.0));
    let job = h.job(TrackGeometry::Quads(vec![Some(Quad::from_size(8.0, 8.0)); 4]));
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = h.pipeline.run(&job, &cancel, None);

    assert!(!result.success);
    assert!(result.error.unwrap().contains("cancelled"));
    assert!(!job.output_path.exists());
    assert!(h.scratch_is_empty());
}

// ── Progress ───────────────────────────────────────────────────

#[test]
fn progress_walks_through_stages() {
    let h = Harness::new(FakeMedia::new(shaded_frames(6, 16, 16), 6.0));
    let job = h.job(TrackGeometry::Quads(vec![Some(Quad::from_size(8.0, 8.0)); 6]));
    let seen: Mutex<Vec<PipelineProgress>> = Mutex::new(Vec::new());
    let record = |p: PipelineProgress| seen.lock().push(p);

    let result = h.pipeline.run(&job, &CancelToken::new(), Some(&record));
    assert!(result.success);

    let seen = seen.into_inner();
    let stages: Vec<PipelineStage> = seen.iter().map(|p| p.stage).collect();
    for stage in [
        PipelineStage::Init,
        PipelineStage::Extracting,
        PipelineStage::Compositing,
        PipelineStage::Assembling,
        PipelineStage::Done,
    ] {
        assert!(stages.contains(&stage), "missing {stage:?}");
    }
    assert_eq!(stages.last(), Some(&PipelineStage::Done));
    let max_done = seen
        .iter()
        .filter(|p| p.stage == PipelineStage::Compositing)
        .map(|p| p.frames_done)
        .max();
    assert_eq!(max_done, Some(6));
}

#[test]
fn failed_job_reports_failed_stage() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 16, 16), 1.0).failing_encode());
    let job = h.job(TrackGeometry::Quads(vec![]));
    let last: Mutex<Option<PipelineStage>> = Mutex::new(None);
    let record = |p: PipelineProgress| *last.lock() = Some(p.stage);
    h.pipeline.run(&job, &CancelToken::new(), Some(&record));
    assert_eq!(*last.lock(), Some(PipelineStage::Failed));
}

// ── Preview ────────────────────────────────────────────────────

#[test]
fn preview_composites_single_frame() {
    let h = Harness::new(FakeMedia::new(shaded_frames(5, 64, 48), 5.0));
    let video = write_video(h.work.path(), "clip.mp4");
    let prop = write_png(h.work.path(), "p.png", &FrameBuffer::filled(8, 8, [0, 255, 0, 255]));
    let params = CompositeParams {
        opacity: 0.5,
        ..Default::default()
    };

    let frame = h
        .pipeline
        .preview_frame(&video, &prop, &center_quad().corners, 3, &params, None)
        .unwrap();

    let base = shaded_frames(5, 64, 48)[3].pixel(30, 20);
    let px = frame.pixel(30, 20);
    assert_eq!(px[1], ((base[1] as f32 / 255.0 * 0.5 + 0.5) * 255.0).round() as u8);
    assert_eq!(frame.pixel(1, 1), base);
    assert!(h.media.encodes().is_empty());
    assert!(h.scratch_is_empty());
}

#[test]
fn preview_rejects_wrong_corner_count() {
    let h = Harness::new(FakeMedia::new(shaded_frames(1, 16, 16), 1.0));
    let video = write_video(h.work.path(), "clip.mp4");
    let prop = write_png(h.work.path(), "p.png", &FrameBuffer::filled(4, 4, [0, 0, 0, 255]));
    let corners = [Point::ZERO, Point::X, Point::ONE];
    assert!(h
        .pipeline
        .preview_frame(&video, &prop, &corners, 0, &CompositeParams::default(), None)
        .is_err());
}
