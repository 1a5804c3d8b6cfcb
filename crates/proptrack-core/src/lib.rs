//! Proptrack Core - Foundation types for planar prop compositing
//!
//! This crate provides the fundamental types shared by every stage:
//! - Error taxonomy (ProptrackError)
//! - Points, quads and rectangles in video pixel space
//! - RGBA8 frame buffers with PNG I/O and bilinear sampling
//! - Cooperative cancellation
//! - The frame file naming convention used between extraction and assembly

pub mod cancel;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod naming;

pub use cancel::CancelToken;
pub use error::{ProptrackError, Result};
pub use frame::FrameBuffer;
pub use geometry::{Point, Quad, Rect};
pub use naming::{frame_file_name, parse_frame_file_name, FRAME_PATTERN};
