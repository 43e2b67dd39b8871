use std::path::Path;

use anyhow::Result;

use super::FourCc;
use crate::frame::Frame;

/// An open output file accepting frames of a fixed size.
pub trait VideoWriter {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush buffered data and finalize the container.
    fn finish(&mut self) -> Result<()>;
}

/// Creates writers for new recordings.
pub trait WriterFactory: Send {
    /// File extension of produced recordings, without the dot.
    fn extension(&self) -> &str;

    fn create(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: FourCc,
    ) -> Result<Box<dyn VideoWriter>>;
}

/// MPEG-4 through FFmpeg when built with `ingest-file-ffmpeg`, Y4M otherwise.
pub fn default_factory() -> Box<dyn WriterFactory> {
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Box::new(super::ffmpeg::FfmpegWriterFactory)
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Box::new(super::y4m::Y4mWriterFactory)
    }
}
