//! Navigation Assistant
//!
//! Real-time object detection, spatial zone classification and voice
//! announcements over a live or file-based video stream, intended as an
//! assistive tool for visually impaired users.
//!
//! # Architecture
//!
//! A dedicated capture worker reads frames, runs detection and tracking,
//! assigns each object to a horizontal zone, draws annotations and hands the
//! result to consumers. Consumers never block the capture loop:
//!
//! ```text
//! capture -> mirror -> zone overlay -> detect/track -> zone assign -> draw -> stats
//!         -> (display, recorder, voice manager)
//! ```
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames
//! - `zone`: zone boundaries and classification
//! - `overlay`: zone bands, detection boxes, stats text
//! - `ingest`: video sources (cameras, files, synthetic)
//! - `detect`: detector backends, model registry, tracker, detection provider
//! - `pipeline`: the capture worker and its control handle
//! - `voice`: announcement cooldown/dedup and the serial speech queue
//! - `recorder`: annotated video recording
//! - `session`: headless controller wiring pipeline output to consumers
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod locale;
pub mod overlay;
pub mod pipeline;
pub mod recorder;
pub mod session;
pub mod voice;
pub mod zone;

pub use detect::{
    BBox, Detection, DetectionProvider, DetectorBackend, ModelRegistry, ProviderFactory,
    SyntheticBackend, TrackedObject, Tracker, TrackingProvider,
};
pub use error::NavError;
pub use frame::Frame;
pub use ingest::{DefaultSourceOpener, FrameSource, SourceDescriptor, SourceKind, SourceOpener};
pub use locale::Language;
pub use pipeline::{
    FrameOutput, FramePipeline, PipelineConfig, PipelineEvent, PipelineReceivers, PipelineState,
    PipelineStats,
};
pub use recorder::{FourCc, Recorder, RecordingInfo, RecordingSummary};
pub use session::{Command, Session};
pub use voice::{NotificationManager, SpeechQueue, SpeechRequest, SpeechSink};
pub use zone::{Zone, ZoneBoundary, ZoneLayout};

/// Lowest confidence threshold the pipeline accepts.
pub const MIN_CONF_THRESHOLD: f32 = 0.01;
/// Highest confidence threshold the pipeline accepts.
pub const MAX_CONF_THRESHOLD: f32 = 1.0;
/// Confidence threshold used when nothing else is configured.
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;

/// Clamp a confidence threshold into the accepted range.
///
/// NaN maps to the default threshold.
pub fn clamp_conf_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        return DEFAULT_CONF_THRESHOLD;
    }
    threshold.clamp(MIN_CONF_THRESHOLD, MAX_CONF_THRESHOLD)
}
