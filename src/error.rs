use std::path::PathBuf;

/// Operator-facing faults.
///
/// Everything else (provider unavailable, recorder write faults) degrades
/// silently into "no detection this frame" or "frame not recorded".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    /// The configured video source could not be opened. The pipeline stays idle.
    #[error("cannot open video source {source_name}: {reason}")]
    SourceOpen { source_name: String, reason: String },

    /// A read or processing fault while running. The pipeline is force-stopped.
    #[error("error in video processing: {0}")]
    SourceRead(String),

    /// The recording writer could not be created. Recording does not begin.
    #[error("failed to open video writer for {}: {reason}", path.display())]
    RecorderOpen { path: PathBuf, reason: String },

    /// The requested detection model has no usable backend.
    #[error("model {name} is not available: {reason}")]
    ModelUnavailable { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
