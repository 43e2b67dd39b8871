//! Real-time frame pipeline.
//!
//! A `FramePipeline` owns at most one capture worker thread. The worker opens
//! the configured source, then for every frame: mirror, draw the zone overlay,
//! detect/track, assign zones, draw boxes and stats, and emit the result.
//!
//! Control runs on the caller's thread and never blocks on the worker except
//! for the bounded join in `stop`. Configuration is an immutable snapshot
//! replaced wholesale by writers; the worker reads one snapshot per iteration,
//! so a change is visible at the next frame boundary at the latest.
//!
//! ```text
//! Idle -> Opening -> Running <-> Paused
//!            |          |          |
//!            v          v          v
//!          Idle <---- Stopping <---+
//! ```

mod handle;
mod processor;
mod shared;
mod worker;

use serde::Serialize;

use crate::detect::TrackedObject;
use crate::error::NavError;
use crate::frame::Frame;
use crate::ingest::SourceKind;

pub use handle::{FramePipeline, PipelineReceivers};
pub use processor::{FpsMeter, FrameProcessor};
pub use shared::PipelineConfig;

/// Pause poll interval for the worker.
pub const PAUSE_POLL: std::time::Duration = std::time::Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Opening,
    Running,
    Paused,
    Stopping,
}

impl PipelineState {
    /// True while a worker owns (or is acquiring) the source.
    pub fn is_active(self) -> bool {
        !matches!(self, PipelineState::Idle)
    }
}

/// Control events. Delivered on an unbounded channel and never dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    CameraError(NavError),
}

/// One processed frame and the objects found in it.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub frame: Frame,
    pub objects: Vec<TrackedObject>,
    /// Instantaneous rate between the last two emitted frames.
    pub fps: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineStats {
    pub fps: f64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub source_kind: SourceKind,
    pub state: PipelineState,
    pub frame_size: Option<(u32, u32)>,
    pub model: String,
}
