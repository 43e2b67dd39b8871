use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// COCO class names, in the order used by stock YOLO exports.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Class names for a model: one per line from `path`, or COCO when absent.
pub fn load_class_names(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(COCO_CLASSES.iter().map(|name| name.to_string()).collect());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let names: Vec<String> = raw
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect();
    if names.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(names)
}

/// Name for `class_id`, falling back to `class_<id>`.
pub fn class_name(names: &[String], class_id: u32) -> String {
    names
        .get(class_id as usize)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}
