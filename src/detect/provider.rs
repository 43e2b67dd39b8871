use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::TrackedObject;
use crate::detect::tracker::{Tracker, TrackerConfig};
use crate::frame::Frame;

/// Detection capability consumed by the pipeline.
///
/// `track` never fails: an unavailable model or an inference fault yields an
/// empty list, which the pipeline treats like an object-free frame.
pub trait DetectionProvider: Send {
    /// Objects with confidence at or above `threshold`, with stable IDs.
    fn track(&mut self, frame: &Frame, threshold: f32) -> Vec<TrackedObject>;

    /// Discard tracking state.
    fn reset(&mut self) {}
}

/// Builds a fresh provider for each pipeline run.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model: &str) -> Box<dyn DetectionProvider>;

    /// Whether `model` can back a provider. The error names the reason.
    fn check(&self, model: &str) -> Result<()>;
}

/// A model from the registry plus an IoU tracker.
pub struct TrackingProvider {
    backend: Option<Arc<Mutex<dyn DetectorBackend>>>,
    tracker: Tracker,
}

impl TrackingProvider {
    pub fn new(backend: Option<Arc<Mutex<dyn DetectorBackend>>>, tracker: TrackerConfig) -> Self {
        Self {
            backend,
            tracker: Tracker::new(tracker),
        }
    }
}

impl DetectionProvider for TrackingProvider {
    fn track(&mut self, frame: &Frame, threshold: f32) -> Vec<TrackedObject> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        let detections = {
            let Ok(mut guard) = backend.lock() else {
                log::warn!("TrackingProvider: backend lock poisoned");
                return Vec::new();
            };
            match guard.detect(frame, threshold) {
                Ok(detections) => detections,
                Err(err) => {
                    log::warn!("TrackingProvider: {} inference failed: {:#}", guard.name(), err);
                    return Vec::new();
                }
            }
        };

        let kept = detections
            .into_iter()
            .filter(|det| det.confidence >= threshold)
            .collect();
        self.tracker
            .update(kept)
            .into_iter()
            .enumerate()
            .map(|(index, det)| TrackedObject::from_detection(det, index))
            .collect()
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}
