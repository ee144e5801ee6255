//! Video sources.
//!
//! [`FrameSource`] is the handle every worker reads frames through: native
//! frame rate, total frame count, and "seek to frame N, then read the next
//! frame" semantics. Reading is split into [`grab`](FrameSource::grab), which
//! advances one frame, and [`retrieve`](FrameSource::retrieve), which
//! converts the grabbed frame to pixels. Workers only pay for the pixel
//! conversion on candidate frames.
//!
//! [`VideoFile`] is the FFmpeg-backed implementation; [`OpenSource`] is the
//! factory each worker uses to open its own, unshared handle.
//!
//! # Example
//!
//! ```no_run
//! use framesieve::{FrameSource, VideoFile};
//!
//! let mut video = VideoFile::open("input.mp4")?;
//! println!("{} frames @ {:.2} fps", video.frame_count(), video.frames_per_second());
//!
//! video.seek(120)?;
//! if video.grab()? {
//!     video.retrieve()?.save("frame_120.png")?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::{DynamicImage, RgbImage};

use crate::error::ExtractError;

/// An open, exclusively owned video stream.
///
/// Frame indices are zero-based positions in the decoded stream. After
/// [`seek`](FrameSource::seek)`(n)`, the next successful
/// [`grab`](FrameSource::grab) positions the source on frame `n`; every
/// following grab advances by exactly one frame.
pub trait FrameSource {
    /// Native frame rate of the video.
    fn frames_per_second(&self) -> f64;

    /// Total number of frames in the video (may be an estimate for
    /// containers that do not record it).
    fn frame_count(&self) -> u64;

    /// Position the source so that the next grab yields `frame_number`.
    fn seek(&mut self, frame_number: u64) -> Result<(), ExtractError>;

    /// Advance to the next frame. Returns `false` once the source is
    /// exhausted.
    fn grab(&mut self) -> Result<bool, ExtractError>;

    /// Decode the pixels of the most recently grabbed frame.
    fn retrieve(&mut self) -> Result<DynamicImage, ExtractError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frames_per_second(&self) -> f64 {
        (**self).frames_per_second()
    }

    fn frame_count(&self) -> u64 {
        (**self).frame_count()
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), ExtractError> {
        (**self).seek(frame_number)
    }

    fn grab(&mut self) -> Result<bool, ExtractError> {
        (**self).grab()
    }

    fn retrieve(&mut self) -> Result<DynamicImage, ExtractError> {
        (**self).retrieve()
    }
}

/// Opens a fresh [`FrameSource`] for a path.
///
/// Each worker calls this for itself, so handles are never shared.
/// Implementations must be [`Send`] and [`Sync`] because in-process workers
/// call them from their own threads.
pub trait OpenSource: Send + Sync {
    /// Open `path` as a frame source.
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, ExtractError>;
}

/// Opens videos with FFmpeg. This is the default opener.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegOpener;

impl OpenSource for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, ExtractError> {
        Ok(Box::new(VideoFile::open(path)?))
    }
}

/// FFmpeg-backed [`FrameSource`].
///
/// Holds the demuxer, a decoder for the best video stream, and an RGB24
/// scaler. Decoded frames are converted to [`DynamicImage::ImageRgb8`] only
/// when [`retrieve`](FrameSource::retrieve) is called.
pub struct VideoFile {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    frames_per_second: f64,
    frame_count: u64,
    width: u32,
    height: u32,
    decoded_frame: VideoFrame,
    scaled_frame: VideoFrame,
    /// Frames before this index are decoded and dropped after a seek.
    seek_target: Option<u64>,
    grabbed: bool,
    eof_sent: bool,
    /// No packet has been read since open.
    pristine: bool,
    file_path: PathBuf,
}

impl Debug for VideoFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoFile")
            .field("file_path", &self.file_path)
            .field("video_stream_index", &self.video_stream_index)
            .field("frames_per_second", &self.frames_per_second)
            .field("frame_count", &self.frame_count)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl VideoFile {
    /// Open a video file and prepare a decoder for its best video stream.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::FileOpen`] if FFmpeg cannot open the file.
    /// - [`ExtractError::NoVideoStream`] if the file has no video.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();
        log::debug!("Opening video file: {}", file_path.display());

        ffmpeg_next::init().map_err(|error| ExtractError::FileOpen {
            path: file_path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| ExtractError::FileOpen {
                path: file_path.clone(),
                reason: error.to_string(),
            })?;

        let container_duration = if input_context.duration() > 0 {
            Duration::from_micros(input_context.duration() as u64)
        } else {
            Duration::ZERO
        };

        let (video_stream_index, time_base, start_pts, frames_per_second, frame_count, decoder) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or(ExtractError::NoVideoStream)?;

            let time_base = stream.time_base();
            let start_pts = if stream.start_time() == i64::MIN {
                0
            } else {
                stream.start_time()
            };

            let frame_rate = stream.avg_frame_rate();
            let frames_per_second = if frame_rate.denominator() != 0 {
                frame_rate.numerator() as f64 / frame_rate.denominator() as f64
            } else {
                let rate = stream.rate();
                if rate.denominator() != 0 {
                    rate.numerator() as f64 / rate.denominator() as f64
                } else {
                    0.0
                }
            };

            // Prefer the container's own count; estimate from duration otherwise.
            let frame_count = if stream.frames() > 0 {
                stream.frames() as u64
            } else if frames_per_second > 0.0 {
                let stream_duration = if stream.duration() > 0 {
                    Duration::from_secs_f64(
                        stream.duration() as f64 * time_base.numerator() as f64
                            / time_base.denominator() as f64,
                    )
                } else {
                    container_duration
                };
                (stream_duration.as_secs_f64() * frames_per_second) as u64
            } else {
                0
            };

            let decoder_context = CodecContext::from_parameters(stream.parameters())
                .map_err(|error| ExtractError::FileOpen {
                    path: file_path.clone(),
                    reason: format!("Failed to read video codec parameters: {error}"),
                })?;
            let decoder =
                decoder_context
                    .decoder()
                    .video()
                    .map_err(|error| ExtractError::FileOpen {
                        path: file_path.clone(),
                        reason: format!("Failed to create video decoder: {error}"),
                    })?;

            (
                stream.index(),
                time_base,
                start_pts,
                frames_per_second,
                frame_count,
                decoder,
            )
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        log::debug!(
            "Opened {}: {}x{} @ {:.3} fps, {} frames",
            file_path.display(),
            width,
            height,
            frames_per_second,
            frame_count,
        );

        Ok(Self {
            input_context,
            decoder,
            scaler,
            video_stream_index,
            time_base,
            start_pts,
            frames_per_second,
            frame_count,
            width,
            height,
            decoded_frame: VideoFrame::empty(),
            scaled_frame: VideoFrame::empty(),
            seek_target: None,
            grabbed: false,
            eof_sent: false,
            pristine: true,
            file_path,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Whether the frame currently in `decoded_frame` is at or past the
    /// pending seek target.
    fn reached_seek_target(&self) -> bool {
        let Some(target) = self.seek_target else {
            return true;
        };
        match self.decoded_frame.timestamp().or(self.decoded_frame.pts()) {
            Some(pts) => {
                crate::utilities::pts_to_frame_number(
                    pts,
                    self.start_pts,
                    self.time_base,
                    self.frames_per_second,
                ) >= target
            }
            // Without a timestamp there is no way to tell; take it.
            None => true,
        }
    }
}

impl FrameSource for VideoFile {
    fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), ExtractError> {
        self.grabbed = false;
        if frame_number == 0 && self.pristine {
            // The demuxer is already at the start.
            return Ok(());
        }

        let timestamp =
            crate::utilities::frame_number_to_seek_timestamp(frame_number, self.frames_per_second);
        self.input_context.seek(timestamp, ..timestamp)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.seek_target = Some(frame_number);
        Ok(())
    }

    fn grab(&mut self) -> Result<bool, ExtractError> {
        self.grabbed = false;
        self.pristine = false;

        loop {
            // Drain frames the decoder has already produced.
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                if !self.reached_seek_target() {
                    continue;
                }
                self.seek_target = None;
                self.grabbed = true;
                return Ok(true);
            }

            if self.eof_sent {
                return Ok(false);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() == self.video_stream_index {
                        if let Err(error) = self.decoder.send_packet(&packet) {
                            log::warn!(
                                "Dropping undecodable packet in {}: {error}",
                                self.file_path.display()
                            );
                        }
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => return Err(ExtractError::from(error)),
            }
        }
    }

    fn retrieve(&mut self) -> Result<DynamicImage, ExtractError> {
        if !self.grabbed {
            return Err(ExtractError::NothingGrabbed);
        }

        self.scaler
            .run(&self.decoded_frame, &mut self.scaled_frame)?;
        let buffer =
            crate::utilities::frame_to_buffer(&self.scaled_frame, self.width, self.height, 3);
        let image = RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            ExtractError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

/// FFmpeg's own console verbosity, independent of the `log` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderLogLevel {
    /// Print nothing.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl DecoderLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            DecoderLogLevel::Quiet => Level::Quiet,
            DecoderLogLevel::Fatal => Level::Fatal,
            DecoderLogLevel::Error => Level::Error,
            DecoderLogLevel::Warning => Level::Warning,
            DecoderLogLevel::Info => Level::Info,
            DecoderLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set FFmpeg's console verbosity for every source opened afterwards.
pub fn set_decoder_log_level(level: DecoderLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}
