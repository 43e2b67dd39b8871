//! Local video file source.
//!
//! Files are decoded with FFmpeg (feature `ingest-file-ffmpeg`); `stub://`
//! paths produce a synthetic clip. File sources are rewindable so the
//! pipeline can loop them.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{StubParams, SyntheticScene};
use super::FrameSource;
use crate::frame::Frame;

/// Synthetic clip length when a `stub://` path gives no frame count.
const DEFAULT_STUB_FRAMES: u64 = 100;

pub struct FileSource {
    path: PathBuf,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticScene),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSource>),
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let display = path.to_string_lossy();
        if display.trim().is_empty() {
            return Err(anyhow!("empty file path"));
        }
        let backend = if display.starts_with("stub://") {
            let mut params = StubParams::parse(&display, 640, 480)?;
            params.frames.get_or_insert(DEFAULT_STUB_FRAMES);
            log::info!("FileSource: opened {} (synthetic)", display);
            FileBackend::Synthetic(SyntheticScene::new(params))
        } else if display.contains("://") {
            return Err(anyhow!("file sources only support local paths: {}", display));
        } else {
            Self::open_decoder(path)?
        };
        Ok(Self {
            path: path.to_path_buf(),
            backend,
        })
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open_decoder(path: &Path) -> Result<FileBackend> {
        Ok(FileBackend::Ffmpeg(Box::new(FfmpegFileSource::open(path)?)))
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open_decoder(path: &Path) -> Result<FileBackend> {
        if !path.exists() {
            return Err(anyhow!("{} does not exist", path.display()));
        }
        Err(anyhow!(
            "decoding {} requires the ingest-file-ffmpeg feature",
            path.display()
        ))
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(scene) => Ok(scene.next_frame()),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(scene) => {
                scene.rewind();
                Ok(())
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.rewind(),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            FileBackend::Synthetic(scene) => (scene.params().width, scene.params().height),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.dimensions(),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn is_live(&self) -> bool {
        false
    }

    fn frames_read(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(scene) => scene.produced(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_read(),
        }
    }
}
