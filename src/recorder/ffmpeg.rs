//! FFmpeg-backed recording encoder.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::util::format::pixel::Pixel;
use ffmpeg::Rational;
use image::imageops::{self, FilterType};

use super::writer::{VideoWriter, WriterFactory};
use super::FourCc;
use crate::frame::Frame;

pub struct FfmpegWriterFactory;

impl WriterFactory for FfmpegWriterFactory {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn create(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: FourCc,
    ) -> Result<Box<dyn VideoWriter>> {
        Ok(Box::new(FfmpegWriter::open(path, width, height, fps, codec)?))
    }
}

fn codec_id(codec: FourCc) -> Result<ffmpeg::codec::Id> {
    match codec.as_str() {
        "mp4v" | "MP4V" | "FMP4" | "XVID" | "DIVX" => Ok(ffmpeg::codec::Id::MPEG4),
        "avc1" | "H264" | "h264" | "X264" => Ok(ffmpeg::codec::Id::H264),
        "MJPG" | "mjpg" => Ok(ffmpeg::codec::Id::MJPEG),
        other => Err(anyhow!("unsupported codec {}", other)),
    }
}

pub struct FfmpegWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegWriter {
    pub fn open(path: &Path, width: u32, height: u32, fps: f64, codec: FourCc) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        // YUV420P needs even dimensions.
        let (width, height) = (width & !1, height & !1);
        if width == 0 || height == 0 {
            return Err(anyhow!("invalid frame size {}x{}", width, height));
        }
        let rate = fps.round().max(1.0) as i32;
        let time_base = Rational::new(1, rate);

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("create {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(codec_id(codec)?)
            .ok_or_else(|| anyhow!("encoder for {} not available", codec))?;
        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(Rational::new(rate, 1)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open video encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().context("write container header")?;

        let scaler = ffmpeg::software::scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    fn drain(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|s| s.time_base())
            .unwrap_or(self.time_base);
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write packet")?;
        }
        Ok(())
    }
}

impl VideoWriter for FfmpegWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("writer already finished"));
        }
        let resized;
        let image = if frame.dimensions() == (self.width, self.height) {
            frame.image()
        } else {
            resized = imageops::resize(frame.image(), self.width, self.height, FilterType::Triangle);
            &resized
        };

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let row_bytes = self.width as usize * 3;
        let data = rgb.data_mut(0);
        for (row, chunk) in image.as_raw().chunks_exact(row_bytes).enumerate() {
            data[row * stride..row * stride + row_bytes].copy_from_slice(chunk);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv).context("convert frame")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&yuv).context("encode frame")?;
        self.drain()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush encoder")?;
        self.drain()?;
        self.output.write_trailer().context("write container trailer")
    }
}
