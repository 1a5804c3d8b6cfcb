//! Test doubles for the two external collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptrack_core::{frame_file_name, CancelToken, FrameBuffer, Point, ProptrackError, Result};
use proptrack_media::{list_frames, MediaInfo, MediaTool};
use proptrack_tracking::{PointTracker, QueryPoint, Track, TrackedPoint};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Marker a file must start with for [`FakeMedia`] to accept it as video.
pub const VIDEO_MAGIC: &[u8] = b"FAKEVIDEO";

/// Write a file [`FakeMedia`] will accept as a video.
pub fn write_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, VIDEO_MAGIC).unwrap();
    path
}

/// Write a PNG and return its path.
pub fn write_png(dir: &Path, name: &str, image: &FrameBuffer) -> PathBuf {
    let path = dir.join(name);
    image.save_png(&path).unwrap();
    path
}

#[derive(Debug, Clone)]
pub struct EncodeCall {
    pub fps: f64,
    pub audio: Option<PathBuf>,
    pub frames: usize,
}

/// Decodes to a fixed list of frames and "encodes" by copying the frame
/// files into a capture directory.
pub struct FakeMedia {
    frames: Vec<FrameBuffer>,
    fps: f64,
    has_audio: bool,
    fail_encode: bool,
    capture: TempDir,
    encodes: Mutex<Vec<EncodeCall>>,
}

impl FakeMedia {
    pub fn new(frames: Vec<FrameBuffer>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            has_audio: false,
            fail_encode: false,
            capture: tempfile::tempdir().unwrap(),
            encodes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_audio(mut self) -> Self {
        self.has_audio = true;
        self
    }

    pub fn failing_encode(mut self) -> Self {
        self.fail_encode = true;
        self
    }

    /// Frame `index` as handed to the encoder.
    pub fn encoded_frame(&self, index: usize) -> PathBuf {
        self.capture.path().join("encoded").join(frame_file_name(index))
    }

    /// Frame `index` as produced by extraction.
    pub fn extracted_frame(&self, index: usize) -> PathBuf {
        self.capture.path().join("extracted").join(frame_file_name(index))
    }

    pub fn encodes(&self) -> Vec<EncodeCall> {
        self.encodes.lock().clone()
    }

    fn check_video(video: &Path) -> Result<()> {
        let bytes = fs::read(video)?;
        if !bytes.starts_with(VIDEO_MAGIC) {
            return Err(ProptrackError::codec(
                "ffprobe",
                Some(1),
                "Invalid data found when processing input",
            ));
        }
        Ok(())
    }

    fn write_frames(&self, dir: &Path, indices: impl Iterator<Item = usize>) -> Result<()> {
        for i in indices {
            self.frames[i].save_png(dir.join(frame_file_name(i)))?;
        }
        Ok(())
    }
}

impl MediaTool for FakeMedia {
    fn probe(&self, video: &Path) -> Result<MediaInfo> {
        Self::check_video(video)?;
        let (width, height) = self.frames.first().map_or((0, 0), FrameBuffer::dimensions);
        Ok(MediaInfo {
            duration_seconds: self.frames.len() as f64 / self.fps,
            fps: self.fps,
            width,
            height,
            has_audio: self.has_audio,
        })
    }

    fn extract_frames(&self, video: &Path, out_dir: &Path, _fps: f64) -> Result<()> {
        Self::check_video(video)?;
        self.write_frames(out_dir, 0..self.frames.len())?;
        let keep = self.capture.path().join("extracted");
        fs::create_dir_all(&keep)?;
        for (_, path) in list_frames(out_dir)? {
            if let Some(name) = path.file_name() {
                fs::copy(&path, keep.join(name))?;
            }
        }
        Ok(())
    }

    fn extract_frame(&self, video: &Path, frame_index: usize, _fps: f64, out_path: &Path) -> Result<()> {
        Self::check_video(video)?;
        let frame = self.frames.get(frame_index).ok_or_else(|| {
            ProptrackError::codec("ffmpeg", Some(1), format!("no frame {frame_index}"))
        })?;
        frame.save_png(out_path)
    }

    fn encode(&self, frame_dir: &Path, fps: f64, audio_source: Option<&Path>, output: &Path) -> Result<()> {
        let frames = list_frames(frame_dir)?;
        let keep = self.capture.path().join("encoded");
        fs::create_dir_all(&keep)?;
        for (_, path) in &frames {
            if let Some(name) = path.file_name() {
                fs::copy(path, keep.join(name))?;
            }
        }
        self.encodes.lock().push(EncodeCall {
            fps,
            audio: audio_source.map(Path::to_path_buf),
            frames: frames.len(),
        });
        if self.fail_encode {
            fs::write(output, b"half an mp4")?;
            return Err(ProptrackError::codec("ffmpeg", Some(1), "Conversion failed!"));
        }
        fs::write(output, b"FAKEMP4")?;
        Ok(())
    }
}

/// Canned tracker behavior.
pub enum TrackerBehavior {
    Tracks(Vec<Track>),
    Timeout,
    Hang(Duration),
}

pub struct FakeTracker {
    behavior: TrackerBehavior,
    fps: Option<f64>,
    calls: AtomicUsize,
}

impl FakeTracker {
    pub fn new(behavior: TrackerBehavior) -> Self {
        Self {
            behavior,
            fps: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report tracks as sampled at `fps` rather than the video's rate.
    pub fn sampling_at(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointTracker for FakeTracker {
    async fn track_points(
        &self,
        _video: &Path,
        query: &[QueryPoint],
        _cancel: &CancelToken,
    ) -> Result<Vec<Track>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            TrackerBehavior::Tracks(tracks) => {
                assert_eq!(tracks.len(), query.len());
                Ok(tracks.clone())
            }
            TrackerBehavior::Timeout => Err(ProptrackError::TrackerTimeout(Duration::from_secs(30))),
            TrackerBehavior::Hang(d) => {
                tokio::time::sleep(*d).await;
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn sampling_fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Tracks for `corners` translating by `step` per frame, `lengths[i]` frames long.
pub fn moving_tracks(corners: &[Point; 4], step: Point, lengths: [usize; 4]) -> Vec<Track> {
    corners
        .iter()
        .zip(lengths)
        .map(|(c, len)| Track {
            label: String::new(),
            color: String::new(),
            points: (0..len)
                .map(|f| {
                    let p = *c + step * f as f64;
                    TrackedPoint::new(p.x, p.y, f as u32, 0.9)
                })
                .collect(),
        })
        .collect()
}

/// Solid frames with a per-frame shade so frames are distinguishable.
pub fn shaded_frames(count: usize, width: u32, height: u32) -> Vec<FrameBuffer> {
    (0..count)
        .map(|i| {
            let shade = (20 + i * 10).min(255) as u8;
            FrameBuffer::filled(width, height, [shade, shade / 2, 255 - shade, 255])
        })
        .collect()
}

/// Entries left under `dir`.
pub fn dir_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
