//! Synthetic frames for `stub://` sources.
//!
//! `stub://<name>?frames=N&width=W&height=H`: every parameter is optional.
//! Without `frames` the source never ends.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use crate::frame::Frame;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubParams {
    pub name: String,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl StubParams {
    pub fn parse(uri: &str, default_width: u32, default_height: u32) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub:// path: {}", uri))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut params = Self {
            name: name.to_string(),
            frames: None,
            width: default_width,
            height: default_height,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter {} must be an integer", key))?;
            match key {
                "frames" => params.frames = Some(parsed),
                "width" => params.width = parsed as u32,
                "height" => params.height = parsed as u32,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if params.width == 0 || params.height == 0 {
            return Err(anyhow!("stub frame size must be non-zero"));
        }
        Ok(params)
    }
}

/// Moving-block pattern; the scene changes every 50 frames.
pub(crate) struct SyntheticScene {
    params: StubParams,
    produced: u64,
    scene_state: u8,
}

impl SyntheticScene {
    pub(crate) fn new(params: StubParams) -> Self {
        Self {
            params,
            produced: 0,
            scene_state: 0,
        }
    }

    pub(crate) fn params(&self) -> &StubParams {
        &self.params
    }

    pub(crate) fn produced(&self) -> u64 {
        self.produced
    }

    /// Next frame, or `None` once the configured frame count is exhausted.
    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        if let Some(limit) = self.params.frames {
            if self.produced >= limit {
                return None;
            }
        }
        let index = self.produced;
        self.produced += 1;
        if index > 0 && index % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        Some(Frame::new(self.render(index), index))
    }

    pub(crate) fn rewind(&mut self) {
        self.produced = 0;
        self.scene_state = 0;
    }

    fn render(&self, index: u64) -> RgbImage {
        let (width, height) = (self.params.width, self.params.height);
        let shade = self.scene_state.wrapping_mul(37);
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            let v = ((x * 255) / width.max(1)) as u8;
            Rgb([v / 2, ((y * 255) / height.max(1)) as u8 / 2, shade])
        });

        let block = (width / 8).max(1);
        let x0 = ((index * 4) % width as u64) as u32;
        let y0 = height / 3;
        for y in y0..(y0 + block).min(height) {
            for x in x0..(x0 + block).min(width) {
                image.put_pixel(x, y, Rgb([230, 230, 230]));
            }
        }
        image
    }
}
