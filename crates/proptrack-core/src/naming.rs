//! Frame file naming shared by extraction, compositing and assembly.
//!
//! Frames are written as `frame_0001.png`, `frame_0002.png`, ... so that a
//! lexical sort of the directory equals temporal order. File numbers are
//! 1-based (FFmpeg's image2 default); frame indices are 0-based.

/// printf-style pattern handed to FFmpeg for both decode and encode.
pub const FRAME_PATTERN: &str = "frame_%04d.png";

/// File name for the 0-based `frame_index`.
pub fn frame_file_name(frame_index: usize) -> String {
    format!("frame_{:04}.png", frame_index + 1)
}

/// Inverse of [`frame_file_name`]; returns the 0-based frame index.
pub fn parse_frame_file_name(name: &str) -> Option<usize> {
    let number = name.strip_prefix("frame_")?.strip_suffix(".png")?;
    if number.len() < 4 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse::<usize>().ok()?.checked_sub(1)
}
