//! Proptrack Composite - Placing a prop image onto a tracked quad.
//!
//! [`warp`] resamples the prop into frame space, [`composite_frame`] blends
//! the result over the decoded frame with a [`BlendMode`], global opacity
//! and optional edge feathering.

pub mod blend;
pub mod compositor;
pub mod feather;
pub mod warp;

pub use blend::BlendMode;
pub use compositor::{composite_frame, composite_into, CompositeParams};
pub use feather::{edge_weight, FeatherMask};
pub use warp::{warp, warp_perspective, warp_triangulated, WarpMethod, WarpedProp};
