#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::{class_name, load_class_names};
use crate::detect::result::{iou, Detection};
use crate::frame::Frame;

const NMS_IOU: f32 = 0.45;

/// YOLOv8 / YOLO11 ONNX export run through tract.
///
/// Expects input `1x3xSxS` (RGB, 0..1) and output `1x(4+C)xN` where each
/// column is `cx, cy, w, h` followed by per-class scores.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    class_names: Vec<String>,
    name: String,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, labels: Option<&Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tract".to_string());

        Ok(Self {
            model,
            input_size,
            class_names: load_class_names(labels)?,
            name,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(&self, output: &Tensor, frame: &Frame, threshold: f32) -> Result<Vec<Detection>> {
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let candidates = shape[2];
        let (width, height) = frame.dimensions();
        let sx = width as f32 / self.input_size as f32;
        let sy = height as f32 / self.input_size as f32;

        let mut found = Vec::new();
        for i in 0..candidates {
            let mut best = (0usize, f32::MIN);
            for c in 0..classes {
                let score = view[[0, 4 + c, i]];
                if score > best.1 {
                    best = (c, score);
                }
            }
            if best.1 < threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, i]], view[[0, 1, i]]);
            let (w, h) = (view[[0, 2, i]], view[[0, 3, i]]);
            let clamp_x = |v: f32| (v * sx).round().clamp(0.0, width as f32) as i32;
            let clamp_y = |v: f32| (v * sy).round().clamp(0.0, height as f32) as i32;
            let bbox = [
                clamp_x(cx - w / 2.0),
                clamp_y(cy - h / 2.0),
                clamp_x(cx + w / 2.0),
                clamp_y(cy + h / 2.0),
            ];
            let class_id = best.0 as u32;
            found.push(Detection::new(
                bbox,
                best.1.clamp(0.0, 1.0),
                class_id,
                class_name(&self.class_names, class_id),
            ));
        }
        Ok(non_max_suppression(found, NMS_IOU))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        self.decode(output, frame, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::solid(self.input_size, self.input_size, [114, 114, 114], 0);
        self.detect(&blank, 1.0).map(|_| ())
    }
}

/// Class-wise greedy NMS, highest confidence first.
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k.bbox, det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_best_per_class() {
        let kept = non_max_suppression(
            vec![
                Detection::new([0, 0, 100, 100], 0.6, 0, "person"),
                Detection::new([5, 5, 105, 105], 0.9, 0, "person"),
                Detection::new([5, 5, 105, 105], 0.7, 56, "chair"),
            ],
            NMS_IOU,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_name, "chair");
    }
}
