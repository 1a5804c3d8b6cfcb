//! Proptrack Pipeline - Composite job orchestration.
//!
//! [`VideoPipeline`] turns a [`CompositeJob`] into a [`CompositeResult`]:
//! it extracts frames through a [`proptrack_media::MediaTool`], composites
//! each one in parallel and re-encodes the sequence with the source audio.
//! [`PropCompositor`] sits in front of it and runs surface tracking first.

pub mod config;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod telemetry;

pub use config::{PipelineConfig, TrackerBackend};
pub use job::{default_output_path, CompositeJob, CompositeRequest, CompositeResult, TrackGeometry};
pub use pipeline::{FrameOutcome, VideoPipeline};
pub use progress::{PipelineProgress, PipelineStage, ProgressFn};
pub use service::PropCompositor;
pub use telemetry::init_logging;
