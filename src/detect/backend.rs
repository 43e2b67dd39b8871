use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is a black-box model: frame in, detections out. It does not
/// assign persistence IDs (the tracker does) and must not retain the frame
/// beyond the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Run detection on a frame.
    ///
    /// Implementations should drop candidates below `confidence_threshold`;
    /// the provider filters again regardless.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
