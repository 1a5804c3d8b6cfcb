//! Local tracking feeding the surface tracker and the pipeline.

use crate::fakes::{dir_entries, write_png, write_video, FakeMedia};
use proptrack_core::{CancelToken, FrameBuffer, Point};
use proptrack_pipeline::{CompositeJob, PipelineConfig, VideoPipeline};
use proptrack_tracking::{LocalTrackerConfig, LucasKanadeTracker, SurfaceTracker};
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────

const SIZE: u32 = 96;

const CORNERS: [Point; 4] = [
    Point::new(30.0, 30.0),
    Point::new(66.0, 30.0),
    Point::new(66.0, 62.0),
    Point::new(30.0, 62.0),
];

/// Smooth texture translated `shift` pixels to the right.
fn textured(shift: f32) -> FrameBuffer {
    let mut frame = FrameBuffer::new(SIZE, SIZE);
    for y in 0..SIZE {
        for x in 0..SIZE {
            let (fx, fy) = (x as f32 - shift, y as f32);
            let v = 0.5 + 0.25 * (fx * 0.21).sin() + 0.25 * (fy * 0.17).cos();
            let c = (v * 255.0).round() as u8;
            frame.set_pixel(x, y, [c, c, c, 255]);
        }
    }
    frame
}

fn sliding_clip(frames: usize) -> Arc<FakeMedia> {
    Arc::new(FakeMedia::new(
        (0..frames).map(|i| textured(i as f32)).collect(),
        1.0,
    ))
}

// ── Scenarios ──────────────────────────────────────────────────

#[tokio::test]
async fn local_tracker_follows_translating_surface() {
    let media = sliding_clip(3);
    let work = tempfile::tempdir().unwrap();
    let video = write_video(work.path(), "slide.mp4");
    let tracker = Arc::new(LucasKanadeTracker::new(media, LocalTrackerConfig::default()));
    let surface = SurfaceTracker::new(tracker);

    let track = surface
        .track_planar_surface(&video, &CORNERS, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(track.frame_count(), 3);
    assert_eq!(track.valid_frames(), 3);
    let h = track.homographies[2].matrix.unwrap();
    let center = h.apply(Point::new(48.0, 46.0)).unwrap();
    assert!(center.distance(Point::new(50.0, 46.0)) < 1.0, "{center:?}");
    assert!(track.corner_tracks.iter().all(|t| t.len() == 3));
}

#[tokio::test]
async fn tracked_surface_drives_the_pipeline() {
    let media = sliding_clip(3);
    let work = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let video = write_video(work.path(), "slide.mp4");
    let prop = write_png(
        work.path(),
        "sticker.png",
        &FrameBuffer::filled(20, 20, [255, 0, 255, 255]),
    );

    let tracker = Arc::new(LucasKanadeTracker::new(
        media.clone(),
        LocalTrackerConfig::default(),
    ));
    let track = SurfaceTracker::new(tracker)
        .track_planar_surface(&video, &CORNERS, &CancelToken::new())
        .await
        .unwrap();

    let pipeline = VideoPipeline::new(
        media.clone(),
        PipelineConfig {
            scratch_root: Some(scratch.path().to_path_buf()),
            ..Default::default()
        },
    );
    let job = CompositeJob::new(video, prop, track, work.path().join("out.mp4"));
    let result = tokio::task::spawn_blocking(move || pipeline.run(&job, &CancelToken::new(), None))
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.frames_composited, 3);
    let last = FrameBuffer::load(media.encoded_frame(2)).unwrap();
    assert_eq!(last.pixel(50, 46), [255, 0, 255, 255]);
    assert_eq!(last.pixel(5, 5), textured(2.0).pixel(5, 5));
    assert_eq!(dir_entries(scratch.path()), 0);
}
