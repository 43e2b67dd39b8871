//! Decoded video frames.
//!
//! - `Frame`: owned RGB8 image (height x width x 3) plus capture metadata.
//!
//! Frames are created by a source, annotated in place by the pipeline and then
//! moved downstream. Nothing retains a frame beyond its consumers.

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Sequence number assigned by the source (1-based).
    pub index: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, index))
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)), index)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Flip horizontally (mirror effect).
    pub fn mirror(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.image);
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.image.as_raw().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_rejects_wrong_length() {
        assert!(Frame::from_rgb(vec![0; 10], 4, 4, 1).is_err());
        let frame = Frame::from_rgb(vec![0; 4 * 4 * 3], 4, 4, 1).unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
        assert_eq!(frame.byte_len(), 48);
    }

    #[test]
    fn mirror_flips_columns() {
        let mut pixels = vec![0u8; 9];
        pixels[0] = 255; // leftmost pixel red
        let mut frame = Frame::from_rgb(pixels, 3, 1, 1).unwrap();
        frame.mirror();
        assert_eq!(frame.image().get_pixel(2, 0).0, [255, 0, 0]);
        assert_eq!(frame.image().get_pixel(0, 0).0, [0, 0, 0]);
    }
}
