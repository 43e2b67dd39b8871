//! Live camera source.
//!
//! `CameraSource` reads from a local V4L2 device node (feature `ingest-v4l2`),
//! with a synthetic fallback for `stub://` device paths. Camera frames are
//! live: there is no rewind, and a device that stops delivering ends the run.

use anyhow::{anyhow, Result};

use super::synthetic::{StubParams, SyntheticScene};
use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or a `stub://` URI.
    pub device: String,
    /// Requested frame rate; the device may ignore it.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    /// Open and start streaming from the configured device.
    pub fn open(config: CameraConfig) -> Result<Self> {
        let backend = if config.device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::open(config)?)
        } else {
            Self::open_device(config)?
        };
        Ok(Self { backend })
    }

    #[cfg(feature = "ingest-v4l2")]
    fn open_device(config: CameraConfig) -> Result<CameraBackend> {
        Ok(CameraBackend::Device(DeviceCamera::open(config)?))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn open_device(config: CameraConfig) -> Result<CameraBackend> {
        Err(anyhow!(
            "camera {} requires the ingest-v4l2 feature",
            config.device
        ))
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => Ok(source.scene.next_frame()),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame().map(Some),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        Err(anyhow!("live camera sources cannot rewind"))
    }

    fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            CameraBackend::Synthetic(source) => {
                let params = source.scene.params();
                (params.width, params.height)
            }
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => (source.active_width, source.active_height),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => format!("{} (synthetic)", source.config.device),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.config.device.clone(),
        }
    }

    fn is_live(&self) -> bool {
        true
    }

    fn frames_read(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.scene.produced(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.frame_count,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    scene: SyntheticScene,
}

impl SyntheticCamera {
    fn open(config: CameraConfig) -> Result<Self> {
        let params = StubParams::parse(&config.device, config.width, config.height)?;
        if params.name == "unavailable" {
            return Err(anyhow!("no camera at {}", config.device));
        }
        log::info!("CameraSource: connected to {} (synthetic)", config.device);
        Ok(Self {
            scene: SyntheticScene::new(params),
            config,
        })
    }
}

// ----------------------------------------------------------------------------
// V4L2 device
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    state: DeviceState,
    pixel_format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn open(config: CameraConfig) -> Result<Self> {
        use anyhow::Context;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", config.device, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            other => {
                return Err(anyhow!(
                    "unsupported pixel format {} on {}",
                    String::from_utf8_lossy(other),
                    config.device
                ))
            }
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", config.device, err);
            }
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{}, {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            config,
            state,
            pixel_format,
            frame_count: 0,
            active_width: format.width,
            active_height: format.height,
        })
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use anyhow::Context;
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.pixel_format);
        let pixels = self.state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        })?;
        let frame = Frame::from_rgb(pixels, width, height, self.frame_count)?;
        self.frame_count += 1;
        Ok(frame)
    }
}

#[cfg(feature = "ingest-v4l2")]
impl Drop for DeviceCamera {
    fn drop(&mut self) {
        log::info!(
            "CameraSource: released {} after {} frames",
            self.config.device,
            self.frame_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            target_fps: 30,
            width: 160,
            height: 120,
        }
    }

    #[test]
    fn stub_camera_produces_frames() -> Result<()> {
        let mut source = CameraSource::open(stub_config("stub://webcam"))?;
        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.dimensions(), (160, 120));
        assert_eq!(source.dimensions(), (160, 120));
        assert!(source.is_live());
        assert!(source.rewind().is_err());
        Ok(())
    }

    #[test]
    fn stub_camera_can_simulate_missing_device() {
        assert!(CameraSource::open(stub_config("stub://unavailable")).is_err());
    }

    #[test]
    fn finite_stub_camera_ends() -> Result<()> {
        let mut source = CameraSource::open(stub_config("stub://webcam?frames=1"))?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }
}
