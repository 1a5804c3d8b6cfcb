//! Request-level tests: tracker, pipeline and failure reporting together.

use crate::fakes::{
    dir_entries, moving_tracks, shaded_frames, write_png, write_video, FakeMedia, FakeTracker,
    TrackerBehavior,
};
use parking_lot::Mutex;
use proptrack_composite::BlendMode;
use proptrack_core::{CancelToken, FrameBuffer, Point, ProptrackError};
use proptrack_pipeline::{
    CompositeRequest, PipelineConfig, PipelineProgress, PipelineStage, ProgressFn, PropCompositor,
    VideoPipeline,
};
use std::sync::Arc;
use tempfile::TempDir;

// ── Helpers ────────────────────────────────────────────────────

const CORNERS: [Point; 4] = [
    Point::new(10.0, 8.0),
    Point::new(30.0, 8.0),
    Point::new(30.0, 24.0),
    Point::new(10.0, 24.0),
];

struct Setup {
    work: TempDir,
    scratch: TempDir,
    tracker: Arc<FakeTracker>,
    media: Arc<FakeMedia>,
    service: PropCompositor,
}

fn setup(frames: usize, behavior: TrackerBehavior, tracker_timeout_ms: u64) -> Setup {
    setup_with(frames, FakeTracker::new(behavior), tracker_timeout_ms)
}

fn setup_with(frames: usize, tracker: FakeTracker, tracker_timeout_ms: u64) -> Setup {
    let scratch = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        scratch_root: Some(scratch.path().to_path_buf()),
        worker_threads: Some(2),
        tracker_timeout_ms,
        ..Default::default()
    };
    let media = Arc::new(FakeMedia::new(shaded_frames(frames, 48, 32), 1.0));
    let tracker = Arc::new(tracker);
    let pipeline = Arc::new(VideoPipeline::new(media.clone(), config));
    let service = PropCompositor::new(tracker.clone(), pipeline);
    Setup {
        work: tempfile::tempdir().unwrap(),
        scratch,
        tracker,
        media,
        service,
    }
}

impl Setup {
    fn request(&self) -> CompositeRequest {
        let video = write_video(self.work.path(), "shot.mp4");
        let prop = write_png(
            self.work.path(),
            "logo.png",
            &FrameBuffer::filled(12, 8, [0, 0, 255, 255]),
        );
        CompositeRequest::new(video, prop, CORNERS.to_vec())
    }
}

// ── Scenarios ──────────────────────────────────────────────────

#[tokio::test]
async fn tracks_and_composites_request() {
    let tracks = moving_tracks(&CORNERS, Point::new(2.0, 0.0), [3; 4]);
    let s = setup(3, TrackerBehavior::Tracks(tracks), 60_000);
    let request = s.request();
    let expected_output = s.work.path().join("shot_composited.mp4");

    let result = s.service.composite(request, &CancelToken::new()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output_path, expected_output);
    assert!(expected_output.is_file());
    assert_eq!(result.frame_count, 3);
    assert_eq!(result.duration_seconds, 3.0);
    assert_eq!(result.frames_composited, 3);
    assert_eq!(s.tracker.calls(), 1);

    // Corner 0 moves 2px right per frame, so frame 2's prop starts at x=14.
    let frame = FrameBuffer::load(s.media.encoded_frame(2)).unwrap();
    assert_eq!(frame.pixel(15, 12), [0, 0, 255, 255]);
    assert_ne!(frame.pixel(12, 12), [0, 0, 255, 255]);
    assert_eq!(dir_entries(s.scratch.path()), 0);
}

#[tokio::test]
async fn request_options_reach_the_compositor() {
    let tracks = moving_tracks(&CORNERS, Point::ZERO, [1; 4]);
    let s = setup(1, TrackerBehavior::Tracks(tracks), 60_000);
    let mut request = s.request();
    request.blend_mode = Some(BlendMode::Multiply);
    request.opacity = Some(1.0);
    request.output_path = Some(s.work.path().join("custom.mp4"));

    let result = s.service.composite(request, &CancelToken::new()).await;

    assert!(result.success);
    assert!(s.work.path().join("custom.mp4").is_file());
    // Multiply with pure blue keeps only the blue channel of the backdrop.
    let base = shaded_frames(1, 48, 32)[0].pixel(20, 16);
    let frame = FrameBuffer::load(s.media.encoded_frame(0)).unwrap();
    assert_eq!(frame.pixel(20, 16), [0, 0, base[2], 255]);
}

#[tokio::test]
async fn tracker_timeout_is_reported_without_output() {
    let s = setup(3, TrackerBehavior::Timeout, 60_000);
    let request = s.request();
    let output = request.resolved_output_path();

    let result = s.service.composite(request, &CancelToken::new()).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(!output.exists());
    assert!(s.media.encodes().is_empty());
    assert_eq!(dir_entries(s.scratch.path()), 0);
}

#[tokio::test]
async fn hung_tracker_hits_the_deadline() {
    let s = setup(3, TrackerBehavior::Hang(std::time::Duration::from_secs(5)), 50);
    let err = s
        .service
        .track(&write_video(s.work.path(), "v.mp4"), &CORNERS, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProptrackError::TrackerTimeout(_)));
}

#[tokio::test]
async fn wrong_corner_count_never_calls_tracker() {
    let s = setup(3, TrackerBehavior::Timeout, 60_000);
    let mut request = s.request();
    request.corners.pop();

    let result = s.service.composite(request, &CancelToken::new()).await;

    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Invalid input"));
    assert_eq!(s.tracker.calls(), 0);
}

#[tokio::test]
async fn collinear_corners_rejected() {
    let s = setup(3, TrackerBehavior::Timeout, 60_000);
    let mut request = s.request();
    request.corners = vec![
        Point::new(0.0, 0.0),
        Point::new(5.0, 5.0),
        Point::new(10.0, 10.0),
        Point::new(15.0, 15.0),
    ];
    let result = s.service.composite(request, &CancelToken::new()).await;
    assert!(!result.success);
    assert_eq!(s.tracker.calls(), 0);
}

#[tokio::test]
async fn missing_prop_is_rejected_before_tracking() {
    let s = setup(3, TrackerBehavior::Timeout, 60_000);
    let mut request = s.request();
    request.prop_image_path = s.work.path().join("missing.png");
    let result = s.service.composite(request, &CancelToken::new()).await;
    assert!(result.error.unwrap().contains("prop image not found"));
    assert_eq!(s.tracker.calls(), 0);
}

#[tokio::test]
async fn uneven_tracks_are_truncated_consistently() {
    let tracks = moving_tracks(&CORNERS, Point::new(0.5, 0.5), [10, 7, 10, 9]);
    let s = setup(10, TrackerBehavior::Tracks(tracks), 60_000);
    let video = write_video(s.work.path(), "v.mp4");

    let track = s
        .service
        .track(&video, &CORNERS, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(track.frame_count(), 7);
    assert!(track.corner_tracks.iter().all(|t| t.len() == 7));
    assert!(!track.warnings.is_empty());
    assert!(track.validate().is_ok());
}

#[tokio::test]
async fn corner_gap_passes_one_frame_through() {
    let mut tracks = moving_tracks(&CORNERS, Point::ZERO, [5; 4]);
    tracks[1].points.remove(2);
    let s = setup(5, TrackerBehavior::Tracks(tracks), 60_000);

    let result = s.service.composite(s.request(), &CancelToken::new()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.frame_count, 5);
    assert_eq!(result.frames_composited, 4);
    let original = shaded_frames(5, 48, 32)[2].pixel(20, 16);
    let gap = FrameBuffer::load(s.media.encoded_frame(2)).unwrap();
    assert_eq!(gap.pixel(20, 16), original);
    for f in [3, 4] {
        let frame = FrameBuffer::load(s.media.encoded_frame(f)).unwrap();
        assert_eq!(frame.pixel(20, 16), [0, 0, 255, 255]);
    }
}

#[tokio::test]
async fn tracker_sampling_rate_drives_the_job() {
    let tracks = moving_tracks(&CORNERS, Point::ZERO, [3; 4]);
    let tracker = FakeTracker::new(TrackerBehavior::Tracks(tracks)).sampling_at(10.0);
    let s = setup_with(3, tracker, 60_000);

    let result = s.service.composite(s.request(), &CancelToken::new()).await;

    assert!(result.success, "{:?}", result.error);
    let encodes = s.media.encodes();
    assert_eq!(encodes.len(), 1);
    assert_eq!(encodes[0].fps, 10.0);
    assert!((result.duration_seconds - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn progress_reaches_done_through_service() {
    let tracks = moving_tracks(&CORNERS, Point::ZERO, [4; 4]);
    let s = setup(4, TrackerBehavior::Tracks(tracks), 60_000);
    let seen = Arc::new(Mutex::new(Vec::<PipelineProgress>::new()));
    let sink = Arc::clone(&seen);
    let progress: Arc<ProgressFn> = Arc::new(move |p| sink.lock().push(p));

    let result = s
        .service
        .composite_with_progress(s.request(), &CancelToken::new(), Some(progress))
        .await;

    assert!(result.success);
    let seen = seen.lock();
    assert_eq!(seen.first().map(|p| p.stage), Some(PipelineStage::Init));
    assert_eq!(seen.last().map(|p| p.stage), Some(PipelineStage::Done));
    assert_eq!(seen.last().map(|p| p.fraction()), Some(1.0));
}

#[tokio::test]
async fn preview_through_service() {
    let s = setup(2, TrackerBehavior::Timeout, 60_000);
    let request = s.request();
    let frame = s
        .service
        .preview(
            &request.video_path,
            &request.prop_image_path,
            &CORNERS,
            1,
            request.params(),
        )
        .await
        .unwrap();
    assert_eq!(frame.dimensions(), (48, 32));
    assert_eq!(frame.pixel(20, 16), [0, 0, 255, 255]);
    assert_eq!(s.tracker.calls(), 0);
}

#[test]
fn request_serializes_in_camel_case() {
    let s = setup(1, TrackerBehavior::Timeout, 60_000);
    let request = s.request();
    let json = serde_json::to_value(&request).unwrap();
    assert!(json.get("videoPath").is_some());
    assert!(json.get("propImagePath").is_some());
}
