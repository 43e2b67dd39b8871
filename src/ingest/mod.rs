//! Video sources.
//!
//! One source is active at a time. A source is described by a
//! `SourceDescriptor` and opened by a `SourceOpener` on the capture worker's
//! own thread, so sources never cross threads and need not be `Send`.
//!
//! - Webcam / external camera (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - `stub://` synthetic sources (always available, for tests and demos)

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use camera::{CameraConfig, CameraSource};
pub use file::FileSource;
pub use synthetic::StubParams;

use crate::frame::Frame;

/// Default index of the built-in webcam.
pub const DEFAULT_WEBCAM_INDEX: u32 = 0;
/// Default index of an external camera.
pub const DEFAULT_EXTERNAL_INDEX: u32 = 1;

/// Which video source to read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDescriptor {
    Webcam(u32),
    External(u32),
    File(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Webcam,
    External,
    File,
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Webcam(_) => SourceKind::Webcam,
            SourceDescriptor::External(_) => SourceKind::External,
            SourceDescriptor::File(_) => SourceKind::File,
        }
    }

    /// Cameras end the run at end of stream; files loop.
    pub fn is_live(&self) -> bool {
        !matches!(self, SourceDescriptor::File(_))
    }

    /// Mirror setting applied when switching to this source.
    ///
    /// The built-in webcam faces the user, so its image is mirrored.
    pub fn default_mirror(&self) -> bool {
        matches!(self, SourceDescriptor::Webcam(_))
    }

    /// Parse `webcam[:N]`, `external[:N]` or a file path, with explicit
    /// default camera indices.
    pub fn parse_with(s: &str, webcam_index: u32, external_index: u32) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty source".to_string());
        }
        let (head, index) = match s.split_once(':') {
            Some((head, tail)) if head == "webcam" || head == "external" => {
                let index = tail
                    .parse::<u32>()
                    .map_err(|_| format!("invalid camera index '{}'", tail))?;
                (head, Some(index))
            }
            _ => (s, None),
        };
        Ok(match head {
            "webcam" => SourceDescriptor::Webcam(index.unwrap_or(webcam_index)),
            "external" => SourceDescriptor::External(index.unwrap_or(external_index)),
            _ => SourceDescriptor::File(PathBuf::from(s)),
        })
    }
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        SourceDescriptor::Webcam(DEFAULT_WEBCAM_INDEX)
    }
}

impl FromStr for SourceDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with(s, DEFAULT_WEBCAM_INDEX, DEFAULT_EXTERNAL_INDEX)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Webcam(index) => write!(f, "webcam:{}", index),
            SourceDescriptor::External(index) => write!(f, "external:{}", index),
            SourceDescriptor::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Webcam => "webcam",
            SourceKind::External => "external",
            SourceKind::File => "file",
        };
        f.write_str(name)
    }
}

/// An open video source.
///
/// Dropping the source releases the underlying capture handle.
pub trait FrameSource {
    /// Next frame; `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Seek back to the first frame. Live sources return an error.
    fn rewind(&mut self) -> Result<()>;

    /// Frame dimensions reported by the source after opening.
    fn dimensions(&self) -> (u32, u32);

    fn describe(&self) -> String;

    fn is_live(&self) -> bool;

    fn frames_read(&self) -> u64 {
        0
    }
}

/// Opens sources for the capture worker.
pub trait SourceOpener: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>>;
}

/// Opens cameras through a device-path template and files by path.
#[derive(Clone, Debug)]
pub struct DefaultSourceOpener {
    /// Device path with `{index}` replaced by the camera index.
    pub device_template: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for DefaultSourceOpener {
    fn default() -> Self {
        Self {
            device_template: "/dev/video{index}".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

impl DefaultSourceOpener {
    pub fn device_path(&self, index: u32) -> String {
        self.device_template.replace("{index}", &index.to_string())
    }
}

impl SourceOpener for DefaultSourceOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
        match descriptor {
            SourceDescriptor::Webcam(index) | SourceDescriptor::External(index) => {
                let source = CameraSource::open(CameraConfig {
                    device: self.device_path(*index),
                    target_fps: self.target_fps,
                    width: self.width,
                    height: self.height,
                })?;
                Ok(Box::new(source))
            }
            SourceDescriptor::File(path) => Ok(Box::new(FileSource::open(path)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_descriptors() {
        assert_eq!("webcam".parse::<SourceDescriptor>(), Ok(SourceDescriptor::Webcam(0)));
        assert_eq!("external".parse::<SourceDescriptor>(), Ok(SourceDescriptor::External(1)));
        assert_eq!("external:4".parse::<SourceDescriptor>(), Ok(SourceDescriptor::External(4)));
        assert_eq!(
            "videos/hall.mp4".parse::<SourceDescriptor>(),
            Ok(SourceDescriptor::File(PathBuf::from("videos/hall.mp4")))
        );
        assert!("webcam:x".parse::<SourceDescriptor>().is_err());
        assert_eq!(
            SourceDescriptor::parse_with("webcam", 2, 3),
            Ok(SourceDescriptor::Webcam(2))
        );
    }

    #[test]
    fn only_the_webcam_is_mirrored_by_default() {
        assert!(SourceDescriptor::Webcam(0).default_mirror());
        assert!(!SourceDescriptor::External(1).default_mirror());
        assert!(!SourceDescriptor::File(PathBuf::from("a.mp4")).default_mirror());
        assert!(SourceDescriptor::External(1).is_live());
    }

    #[test]
    fn opener_expands_device_template() -> Result<()> {
        let opener = DefaultSourceOpener {
            device_template: "stub://cam{index}?width=64&height=48".to_string(),
            ..DefaultSourceOpener::default()
        };
        assert_eq!(opener.device_path(1), "stub://cam1?width=64&height=48");
        let source = opener.open(&SourceDescriptor::External(1))?;
        assert_eq!(source.dimensions(), (64, 48));
        assert!(source.is_live());
        Ok(())
    }
}
