mod backend;
pub mod backends;
pub mod labels;
mod provider;
mod registry;
mod result;
mod tracker;

pub use backend::DetectorBackend;
pub use backends::SyntheticBackend;
pub use provider::{DetectionProvider, ProviderFactory, TrackingProvider};
pub use registry::{ModelRegistry, ModelSlot};
pub use result::{iou, BBox, Detection, TrackedObject};
pub use tracker::{Tracker, TrackerConfig};
