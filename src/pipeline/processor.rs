use std::time::Instant;

use anyhow::Result;

use super::{FrameOutput, PipelineConfig};
use crate::detect::DetectionProvider;
use crate::frame::Frame;
use crate::overlay;
use crate::zone::ZoneLayout;

/// Instantaneous frame rate, `1 / Δt` between consecutive ticks.
#[derive(Debug)]
pub struct FpsMeter {
    last: Instant,
    fps: f64,
}

impl FpsMeter {
    pub fn new(now: Instant) -> Self {
        Self { last: now, fps: 0.0 }
    }

    pub fn current(&self) -> f64 {
        self.fps
    }

    /// Record a frame at `now`. A non-positive interval keeps the last value.
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        if dt > 0.0 {
            self.fps = 1.0 / dt;
        }
        self.last = now;
        self.fps
    }
}

/// Per-run frame transform: owns the zone layout, the provider and the FPS meter.
pub struct FrameProcessor {
    layout: ZoneLayout,
    provider: Box<dyn DetectionProvider>,
    fps: FpsMeter,
}

impl FrameProcessor {
    pub fn new(frame_width: u32, divisions: usize, provider: Box<dyn DetectionProvider>) -> Result<Self> {
        Ok(Self {
            layout: ZoneLayout::new(frame_width, divisions)?,
            provider,
            fps: FpsMeter::new(Instant::now()),
        })
    }

    pub fn layout(&self) -> &ZoneLayout {
        &self.layout
    }

    /// Run one frame through the pipeline stages, in order:
    /// mirror, zone overlay, detection, zone assignment and boxes, stats.
    ///
    /// The FPS drawn is the rate of emitted frames; call [`Self::emitted_at`]
    /// once the output has been handed to the consumer.
    pub fn process(&mut self, mut frame: Frame, config: &PipelineConfig) -> FrameOutput {
        if config.mirror {
            frame.mirror();
        }
        if self.layout.update_width(frame.width()) {
            log::debug!("FramePipeline: zone boundaries rebuilt for width {}", frame.width());
        }

        overlay::draw_zones(frame.image_mut(), &self.layout, config.language, config.zone_alpha);

        let mut objects = self.provider.track(&frame, config.confidence_threshold);
        for object in &mut objects {
            object.zone = self.layout.classify(object.bbox);
            overlay::draw_detection(frame.image_mut(), object);
        }

        overlay::draw_stats(
            frame.image_mut(),
            self.fps.current(),
            config.mirror,
            config.show_fps,
            config.language,
        );

        FrameOutput {
            frame,
            objects,
            fps: self.fps.current(),
        }
    }

    /// Record that a frame left the pipeline at `now`; returns the updated rate.
    pub fn emitted_at(&mut self, now: Instant) -> f64 {
        self.fps.tick_at(now)
    }

    pub fn fps(&self) -> f64 {
        self.fps.current()
    }
}
