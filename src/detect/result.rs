use serde::Serialize;

use crate::zone::{center_x_of, Zone};

/// Pixel rectangle `(x1, y1, x2, y2)`.
pub type BBox = [i32; 4];

/// Raw backend output for one object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: u32,
    pub class_name: String,
    /// Persistence ID when the backend or tracker supplies one.
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(bbox: BBox, confidence: f32, class_id: u32, class_name: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: class_name.into(),
            track_id: None,
        }
    }

    pub fn area(&self) -> i64 {
        let [x1, y1, x2, y2] = self.bbox;
        ((x2 - x1).max(0) as i64) * ((y2 - y1).max(0) as i64)
    }
}

/// A detection enriched with a persistence ID and its zone.
///
/// Created fresh for every processed frame and passed by value downstream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedObject {
    pub id: u64,
    pub bbox: BBox,
    pub center: (i32, i32),
    pub confidence: f32,
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: u32,
    pub zone: Zone,
}

impl TrackedObject {
    /// Build from a detection at position `index` in the provider's output.
    ///
    /// The positional index stands in for the ID when the provider gave none.
    /// The zone starts at the Center fallback until the pipeline assigns it.
    pub fn from_detection(detection: Detection, index: usize) -> Self {
        let [_, y1, _, y2] = detection.bbox;
        let center = (center_x_of(detection.bbox), (y1 + y2).div_euclid(2));
        Self {
            id: detection.track_id.unwrap_or(index as u64),
            bbox: detection.bbox,
            center,
            confidence: detection.confidence.clamp(0.0, 1.0),
            class_name: detection.class_name,
            class_id: detection.class_id,
            zone: Zone::default(),
        }
    }
}

/// Intersection over union of two boxes.
pub fn iou(a: BBox, b: BBox) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = ((ix2 - ix1).max(0) as f64) * ((iy2 - iy1).max(0) as f64);
    if inter <= 0.0 {
        return 0.0;
    }
    let area = |r: BBox| ((r[2] - r[0]).max(0) as f64) * ((r[3] - r[1]).max(0) as f64);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        (inter / union) as f32
    }
}
