//! Recording of annotated frames.
//!
//! One recording at a time, written to `recording_<YYYYmmdd_HHMMSS>.<ext>` in
//! the configured directory. Write faults never propagate to the caller; a
//! frame that could not be written is simply not counted.

mod writer;
mod y4m;

#[cfg(feature = "ingest-file-ffmpeg")]
mod ffmpeg;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

pub use writer::{default_factory, VideoWriter, WriterFactory};
pub use y4m::{Y4mWriter, Y4mWriterFactory};

#[cfg(feature = "ingest-file-ffmpeg")]
pub use self::ffmpeg::{FfmpegWriter, FfmpegWriterFactory};

use crate::error::NavError;
use crate::frame::Frame;

pub const DEFAULT_RECORDING_FPS: f64 = 20.0;
pub const DEFAULT_KEEP_RECORDINGS: usize = 10;
const FILE_PREFIX: &str = "recording_";

/// Four-character codec code, e.g. `mp4v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl Default for FourCc {
    fn default() -> Self {
        FourCc(*b"mp4v")
    }
}

impl FromStr for FourCc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(format!("codec must be 4 ASCII characters, got {:?}", s));
        }
        Ok(FourCc([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration: Duration,
}

/// Snapshot of the recorder state.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingInfo {
    pub is_recording: bool,
    pub path: Option<PathBuf>,
    pub frame_count: u64,
    pub duration: Duration,
}

struct ActiveRecording {
    path: PathBuf,
    writer: Box<dyn VideoWriter>,
    frame_count: u64,
    started_at: Instant,
}

pub struct Recorder {
    dir: PathBuf,
    codec: FourCc,
    factory: Box<dyn WriterFactory>,
    active: Option<ActiveRecording>,
    keep: usize,
}

impl Recorder {
    /// Create a recorder writing into `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, codec: FourCc, factory: Box<dyn WriterFactory>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create recording directory {}", dir.display()))?;
        Ok(Self {
            dir,
            codec,
            factory,
            active: None,
            keep: DEFAULT_KEEP_RECORDINGS,
        })
    }

    /// Number of recordings retained after each stop. 0 disables cleanup.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a recording of `width`x`height` frames.
    ///
    /// Returns the current path unchanged if a recording is already active.
    pub fn start(&mut self, width: u32, height: u32, fps: f64) -> Result<PathBuf> {
        if let Some(active) = &self.active {
            return Ok(active.path.clone());
        }
        let path = self.next_path();
        let writer = self
            .factory
            .create(&path, width, height, fps, self.codec)
            .map_err(|err| NavError::RecorderOpen {
                path: path.clone(),
                reason: format!("{:#}", err),
            })?;
        log::info!(
            "Recorder: started {} ({}x{} @ {} fps, {})",
            path.display(),
            width,
            height,
            fps,
            self.codec
        );
        self.active = Some(ActiveRecording {
            path: path.clone(),
            writer,
            frame_count: 0,
            started_at: Instant::now(),
        });
        Ok(path)
    }

    /// Append a frame. False when not recording or the write failed.
    pub fn write(&mut self, frame: &Frame) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match active.writer.write(frame) {
            Ok(()) => {
                active.frame_count += 1;
                true
            }
            Err(err) => {
                log::warn!("Recorder: frame {} not written: {:#}", frame.index, err);
                false
            }
        }
    }

    /// Finish the active recording, if any.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        let mut active = self.active.take()?;
        if let Err(err) = active.writer.finish() {
            log::warn!("Recorder: finalizing {} failed: {:#}", active.path.display(), err);
        }
        let summary = RecordingSummary {
            path: active.path,
            frame_count: active.frame_count,
            duration: active.started_at.elapsed(),
        };
        log::info!(
            "Recorder: stopped {} ({} frames, {:.1}s)",
            summary.path.display(),
            summary.frame_count,
            summary.duration.as_secs_f64()
        );
        if self.keep > 0 {
            if let Err(err) = self.cleanup_old_recordings(self.keep) {
                log::warn!("Recorder: cleanup failed: {:#}", err);
            }
        }
        Some(summary)
    }

    pub fn info(&self) -> RecordingInfo {
        match &self.active {
            Some(active) => RecordingInfo {
                is_recording: true,
                path: Some(active.path.clone()),
                frame_count: active.frame_count,
                duration: active.started_at.elapsed(),
            },
            None => RecordingInfo {
                is_recording: false,
                path: None,
                frame_count: 0,
                duration: Duration::ZERO,
            },
        }
    }

    /// Recordings in the directory, newest first.
    pub fn list_recordings(&self) -> Result<Vec<PathBuf>> {
        let suffix = format!(".{}", self.factory.extension());
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("read recording directory {}", self.dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(FILE_PREFIX) && name.ends_with(&suffix) && entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        // Timestamped names sort chronologically.
        paths.sort_by(|a, b| b.cmp(a));
        Ok(paths)
    }

    /// Delete all but the `keep` newest recordings. The active file is never removed.
    pub fn cleanup_old_recordings(&self, keep: usize) -> Result<usize> {
        let active = self.active.as_ref().map(|a| a.path.as_path());
        let mut removed = 0;
        for path in self.list_recordings()?.into_iter().skip(keep) {
            if Some(path.as_path()) == active {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("Recorder: removed old recording {}", path.display());
                    removed += 1;
                }
                Err(err) => log::warn!("Recorder: cannot remove {}: {}", path.display(), err),
            }
        }
        Ok(removed)
    }

    fn next_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let ext = self.factory.extension();
        let path = self.dir.join(format!("{}{}.{}", FILE_PREFIX, stamp, ext));
        if !path.exists() {
            return path;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{}{}_{}.{}", FILE_PREFIX, stamp, n, ext)))
            .find(|p| !p.exists())
            .unwrap_or(path)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}
