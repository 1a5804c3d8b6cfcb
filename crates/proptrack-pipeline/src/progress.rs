//! Job stages and progress reports.

use serde::{Deserialize, Serialize};

/// Stages of a composite job, in order. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Extracting,
    Compositing,
    Assembling,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Init => "Preparing",
            Self::Extracting => "Extracting frames",
            Self::Compositing => "Compositing",
            Self::Assembling => "Encoding output",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Snapshot delivered to the progress callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub stage: PipelineStage,
    /// Frames finished in the compositing stage.
    pub frames_done: usize,
    /// Total frames, once known.
    pub total_frames: usize,
}

impl PipelineProgress {
    pub fn new(stage: PipelineStage, frames_done: usize, total_frames: usize) -> Self {
        Self {
            stage,
            frames_done,
            total_frames,
        }
    }

    /// Compositing completion in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        match self.stage {
            PipelineStage::Done => 1.0,
            _ if self.total_frames == 0 => 0.0,
            _ => (self.frames_done as f32 / self.total_frames as f32).min(1.0),
        }
    }
}

/// Progress callback; invoked from worker threads.
pub type ProgressFn = dyn Fn(PipelineProgress) + Send + Sync;
