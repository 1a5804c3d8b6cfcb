//! Proptrack Tracking - Homography solving and planar surface tracking.
//!
//! The [`PointTracker`] trait is the seam to whatever follows individual
//! points through a video: [`RemoteTracker`] talks to the tracking service,
//! [`LucasKanadeTracker`] runs locally on extracted frames.

pub mod homography;
pub mod lucas_kanade;
pub mod point_tracker;
pub mod pyramid;
pub mod remote;
pub mod surface;

pub use homography::{solve, Homography};
pub use lucas_kanade::{LocalTrackerConfig, LucasKanadeTracker};
pub use point_tracker::{PointTracker, QueryPoint, Track, TrackedPoint};
pub use pyramid::{GrayImage, ImagePyramid};
pub use remote::{RemoteTracker, TrackerConfig};
pub use surface::{
    build_planar_track, DegeneratePolicy, HomographyMatrix, PlanarTrack, SurfaceTracker,
    CORNER_COLORS, CORNER_LABELS,
};
