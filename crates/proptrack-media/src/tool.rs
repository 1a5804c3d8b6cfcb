//! The Media Codec Tool collaborator.

use crate::probe::MediaInfo;
use proptrack_core::{parse_frame_file_name, Result};
use std::path::{Path, PathBuf};

/// External decode/encode process.
///
/// Every method is a single blocking call; implementations must report a
/// non-zero subprocess exit as [`proptrack_core::ProptrackError::CodecToolFailure`].
pub trait MediaTool: Send + Sync {
    /// Read stream metadata without decoding.
    fn probe(&self, video: &Path) -> Result<MediaInfo>;

    /// Decode `video` at `fps` into `out_dir/frame_%04d.png`, numbered from 1.
    fn extract_frames(&self, video: &Path, out_dir: &Path, fps: f64) -> Result<()>;

    /// Decode the single frame at 0-based `frame_index` (at `fps`) to `out_path`.
    fn extract_frame(&self, video: &Path, frame_index: usize, fps: f64, out_path: &Path)
        -> Result<()>;

    /// Encode `frame_dir/frame_%04d.png` at `fps` into `output`, muxing the
    /// audio stream of `audio_source` unchanged when given.
    fn encode(
        &self,
        frame_dir: &Path,
        fps: f64,
        audio_source: Option<&Path>,
        output: &Path,
    ) -> Result<()>;
}

/// List `frame_NNNN.png` files in `dir` as `(frame_index, path)`, in temporal order.
pub fn list_frames(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(parse_frame_file_name) {
            frames.push((index, entry.path()));
        }
    }
    frames.sort_by_key(|(index, _)| *index);
    Ok(frames)
}
