//! Proptrack Media - FFmpeg integration for frame extraction and assembly
//!
//! This crate handles:
//! - Media file probing (duration, frame rate, dimensions, audio presence)
//! - Decoding a video into a `frame_%04d.png` sequence
//! - Encoding a frame sequence back to video, muxing the source audio
//!
//! All three operations sit behind the [`MediaTool`] trait so the pipeline
//! can be driven by an in-memory implementation in tests.

pub mod ffmpeg;
pub mod probe;
pub mod tool;

pub use ffmpeg::{EncoderConfig, FfmpegTool};
pub use probe::MediaInfo;
pub use tool::{list_frames, MediaTool};
