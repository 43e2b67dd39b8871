//! Frame annotations.
//!
//! Everything here is cosmetic: zone dividers and labels, per-object boxes,
//! and the statistics corner. Coordinates outside the image are clipped.

pub mod font;

use image::{Rgb, RgbImage};

use crate::detect::TrackedObject;
use crate::locale::Language;
use crate::zone::ZoneLayout;

/// Transparency of the zone label bands.
pub const DEFAULT_ZONE_ALPHA: f32 = 0.3;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const STATS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BAND_TOP: i32 = 10;
const BAND_BOTTOM: i32 = 40;
const BAND_INSET: i32 = 10;

/// Fill an axis-aligned rectangle (inclusive corners).
pub fn fill_rect(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    let Some((x0, y0, x1, y1)) = clip(img, x0, y0, x1, y1) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            img.put_pixel(x, y, color);
        }
    }
}

/// Draw a rectangle border with given thickness (inclusive corners).
pub fn draw_rect(img: &mut RgbImage, bbox: [i32; 4], color: Rgb<u8>, thickness: u32) {
    let [x0, y0, x1, y1] = bbox;
    for t in 0..thickness as i32 {
        let (xx0, yy0, xx1, yy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        fill_rect(img, xx0, yy0, xx1, yy0, color);
        fill_rect(img, xx0, yy1, xx1, yy1, color);
        fill_rect(img, xx0, yy0, xx0, yy1, color);
        fill_rect(img, xx1, yy0, xx1, yy1, color);
    }
}

/// Render `text` with its top-left corner at (x, y).
pub fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let mut pen_x = x;
    for c in text.chars() {
        let rows = font::glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..font::GLYPH_WIDTH as i32 {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let px = pen_x + col * scale;
                let py = y + row as i32 * scale;
                fill_rect(img, px, py, px + scale - 1, py + scale - 1, color);
            }
        }
        pen_x += font::ADVANCE as i32 * scale;
    }
}

/// Blend `overlay` onto `img` inside the given rectangle:
/// `img = alpha * overlay + (1 - alpha) * img`.
pub fn blend_region(
    img: &mut RgbImage,
    overlay: &RgbImage,
    rect: (i32, i32, i32, i32),
    alpha: f32,
) {
    let alpha = alpha.clamp(0.0, 1.0);
    let (x0, y0, x1, y1) = rect;
    let Some((x0, y0, x1, y1)) = clip(img, x0, y0, x1, y1) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            let top = overlay.get_pixel(x, y).0;
            let base = img.get_pixel_mut(x, y);
            for channel in 0..3 {
                let mixed = alpha * top[channel] as f32 + (1.0 - alpha) * base.0[channel] as f32;
                base.0[channel] = mixed.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Draw zone dividers and semi-transparent zone name bands.
pub fn draw_zones(img: &mut RgbImage, layout: &ZoneLayout, language: Language, alpha: f32) {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    for x in layout.divider_positions() {
        fill_rect(img, x as i32, 0, x as i32, height as i32 - 1, WHITE);
    }

    // Bands are drawn on a copy and blended back; pixels outside the bands are
    // identical in both images so only the band rectangles need blending.
    let mut overlay = img.clone();
    let mut bands = Vec::with_capacity(layout.divisions());
    let ranges = layout.division_ranges();
    let edges = band_edges(layout, width);
    for ((start, end), zone) in edges.into_iter().zip(layout.zones()) {
        let rect = (
            start as i32 + BAND_INSET,
            BAND_TOP,
            end as i32 - BAND_INSET,
            BAND_BOTTOM,
        );
        fill_rect(&mut overlay, rect.0, rect.1, rect.2, rect.3, zone.color());
        let label = language.zone_label(zone);
        let label_x = if ranges.len() == 3 && start > 0 {
            start as i32 + 50
        } else {
            start as i32 + 20
        };
        draw_text(&mut overlay, label_x, BAND_TOP + 8, &label, WHITE, 2);
        bands.push(rect);
    }
    for rect in bands {
        blend_region(img, &overlay, rect, alpha);
    }
}

fn band_edges(layout: &ZoneLayout, width: u32) -> Vec<(u32, u32)> {
    let mut cuts = vec![0];
    cuts.extend(layout.divider_positions());
    cuts.push(width);
    cuts.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Label drawn above an object's box: `class #id 0.87`.
pub fn detection_label(object: &TrackedObject) -> String {
    format!(
        "{} #{} {:.2}",
        object.class_name, object.id, object.confidence
    )
}

/// Draw one object's box and label in its zone color.
pub fn draw_detection(img: &mut RgbImage, object: &TrackedObject) {
    let color = object.zone.color();
    draw_rect(img, object.bbox, color, 2);
    let [x1, y1, _, _] = object.bbox;
    let label = detection_label(object);
    // Keep the label on screen for boxes touching the right edge.
    let max_x = img.width() as i32 - font::text_width(&label, 1) as i32;
    let label_x = x1.min(max_x).max(0);
    let label_y = (y1 - 10 - font::GLYPH_HEIGHT as i32).max(0);
    draw_text(img, label_x, label_y, &label, color, 1);
}

/// Draw the statistics corner: FPS (optional) and mirror status.
pub fn draw_stats(img: &mut RgbImage, fps: f64, mirror: bool, show_fps: bool, language: Language) {
    let width = img.width() as i32;
    let x = width - 150;
    if show_fps {
        draw_text(img, x, 20, &format!("FPS: {:.2}", fps), STATS_COLOR, 2);
    }
    draw_text(img, x, 50, language.mirror_status(mirror), STATS_COLOR, 2);
}

fn clip(img: &RgbImage, x0: i32, y0: i32, x1: i32, y1: i32) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));
    if x1 < 0 || y1 < 0 || x0 >= w as i32 || y0 >= h as i32 {
        return None;
    }
    Some((
        x0.max(0) as u32,
        y0.max(0) as u32,
        x1.min(w as i32 - 1) as u32,
        y1.min(h as i32 - 1) as u32,
    ))
}
