//! Uncompressed YUV4MPEG2 output.
//!
//! 4:4:4 planes, BT.601 full-range conversion. Frames whose size differs from
//! the stream header are resized to fit.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};

use super::writer::{VideoWriter, WriterFactory};
use super::FourCc;
use crate::frame::Frame;

pub struct Y4mWriterFactory;

impl WriterFactory for Y4mWriterFactory {
    fn extension(&self) -> &str {
        "y4m"
    }

    fn create(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: FourCc,
    ) -> Result<Box<dyn VideoWriter>> {
        if codec != FourCc::default() {
            log::debug!("Recorder: codec {} ignored by y4m output", codec);
        }
        Ok(Box::new(Y4mWriter::create(path, width, height, fps)?))
    }
}

pub struct Y4mWriter {
    out: BufWriter<File>,
    width: u32,
    height: u32,
    planes: Vec<u8>,
}

impl Y4mWriter {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("invalid frame size {}x{}", width, height);
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let (num, den) = fps_fraction(fps);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444",
            width, height, num, den
        )
        .context("write y4m header")?;
        Ok(Self {
            out,
            width,
            height,
            planes: Vec::with_capacity(width as usize * height as usize * 3),
        })
    }
}

impl VideoWriter for Y4mWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let resized;
        let image = if frame.dimensions() == (self.width, self.height) {
            frame.image()
        } else {
            resized = imageops::resize(frame.image(), self.width, self.height, FilterType::Triangle);
            &resized
        };

        let area = self.width as usize * self.height as usize;
        self.planes.clear();
        self.planes.resize(area * 3, 0);
        for (i, pixel) in image.pixels().enumerate() {
            let (y, u, v) = rgb_to_yuv(pixel.0);
            self.planes[i] = y;
            self.planes[area + i] = u;
            self.planes[2 * area + i] = v;
        }
        self.out.write_all(b"FRAME\n").context("write y4m frame")?;
        self.out.write_all(&self.planes).context("write y4m frame")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().context("flush y4m output")
    }
}

fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    (clamp(y), clamp(u), clamp(v))
}

fn fps_fraction(fps: f64) -> (u64, u64) {
    if !(fps.is_finite() && fps > 0.0) {
        return (20, 1);
    }
    if fps.fract() == 0.0 {
        (fps as u64, 1)
    } else {
        ((fps * 1000.0).round() as u64, 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.y4m");
        let mut writer = Y4mWriter::create(&path, 4, 2, 20.0)?;
        writer.write(&Frame::solid(4, 2, [255, 255, 255], 0))?;
        writer.write(&Frame::solid(8, 4, [0, 0, 0], 1))?;
        writer.finish()?;

        let bytes = std::fs::read(&path)?;
        let header = b"YUV4MPEG2 W4 H2 F20:1 Ip A1:1 C444\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 2 * (6 + 4 * 2 * 3));
        assert_eq!(bytes[header.len() + 6], 255);
        Ok(())
    }

    #[test]
    fn gray_maps_to_neutral_chroma() {
        assert_eq!(rgb_to_yuv([128, 128, 128]), (128, 128, 128));
        assert_eq!(fps_fraction(29.97), (29970, 1000));
    }
}
