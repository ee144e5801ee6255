//! The frame worker.
//!
//! A [`FrameWorker`] scans one [`FrameRange`] of a video through its own
//! [`FrameSource`], scores every candidate frame, and writes the sharp ones
//! to `<output_dir>/frame_NNNNNN.jpg`, named by absolute frame index. Ranges
//! of different workers are disjoint, so their files never collide even
//! though they share the output directory.
//!
//! # Example
//!
//! ```no_run
//! use framesieve::{FrameRange, FrameWorker, ProgressBoard, VideoFile, WorkerJob};
//!
//! let job = WorkerJob::new(0, "input.mp4", "frames", FrameRange::new(0, 300))
//!     .with_target_fps(2)
//!     .with_blur_threshold(40.0);
//!
//! let (board, mut slots) = ProgressBoard::new(1);
//! let mut video = VideoFile::open("input.mp4")?;
//! let progress = FrameWorker::new(job).run(&mut video, &mut slots[0])?;
//! println!("saved {} frames", progress.frames_saved);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};

use crate::{
    blur::BlurScorer,
    error::ExtractError,
    partition::FrameRange,
    progress::{CancellationToken, PublishProgress, WorkerProgress},
    sampling,
    source::FrameSource,
};

/// Examined frames between two progress publications.
pub const PUBLISH_INTERVAL: u64 = 10;

/// Quality of written JPEG files.
pub const JPEG_QUALITY: u8 = 95;

/// Everything one worker needs to process its range.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerJob {
    /// Id used in progress messages.
    pub worker_id: usize,
    /// Video the worker opens for itself.
    pub video_path: PathBuf,
    /// Shared directory for frame files.
    pub output_dir: PathBuf,
    /// Absolute frames to scan.
    pub range: FrameRange,
    /// Desired output rate; the sampling step is derived from the source's
    /// native rate.
    pub target_fps: u32,
    /// Minimum sharpness, exclusive.
    pub blur_threshold: f64,
}

impl WorkerJob {
    /// A job with a 30 fps target and a 5.0 blur threshold.
    pub fn new(
        worker_id: usize,
        video_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        range: FrameRange,
    ) -> Self {
        Self {
            worker_id,
            video_path: video_path.into(),
            output_dir: output_dir.into(),
            range,
            target_fps: 30,
            blur_threshold: 5.0,
        }
    }

    /// Set the desired output rate.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the sharpness threshold.
    #[must_use]
    pub fn with_blur_threshold(mut self, threshold: f64) -> Self {
        self.blur_threshold = threshold;
        self
    }
}

/// Processes one [`WorkerJob`].
#[derive(Debug, Clone)]
pub struct FrameWorker {
    job: WorkerJob,
    scorer: BlurScorer,
    publish_interval: u64,
    cancellation: Option<CancellationToken>,
}

impl FrameWorker {
    /// A worker for `job`, publishing every [`PUBLISH_INTERVAL`] frames.
    pub fn new(job: WorkerJob) -> Self {
        let scorer = BlurScorer::new(job.blur_threshold);
        Self {
            job,
            scorer,
            publish_interval: PUBLISH_INTERVAL,
            cancellation: None,
        }
    }

    /// Publish every `frames` examined frames instead of every
    /// [`PUBLISH_INTERVAL`]. Zero is treated as one.
    #[must_use]
    pub fn with_publish_interval(mut self, frames: u64) -> Self {
        self.publish_interval = frames.max(1);
        self
    }

    /// Stop between frames once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The job this worker processes.
    pub fn job(&self) -> &WorkerJob {
        &self.job
    }

    /// Scan the job's range.
    ///
    /// Publishes once at start, after every publish interval of examined
    /// frames, and a final time with `finished` set. Running out of frames
    /// before the end of the range is a normal finish.
    ///
    /// # Errors
    ///
    /// Source, encoding, and I/O errors end the scan early. A cancelled
    /// token finalizes progress and returns [`ExtractError::Cancelled`].
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        progress: &mut dyn PublishProgress,
    ) -> Result<WorkerProgress, ExtractError> {
        let started = Instant::now();
        let range = self.job.range;
        let mut state = WorkerProgress::started(self.job.worker_id, range);
        progress.publish(&state)?;

        if range.is_empty() {
            log::debug!("Worker {} has an empty range", self.job.worker_id);
            return finalize(state, started, progress);
        }

        let step = sampling::step(source.frames_per_second(), self.job.target_fps);
        log::debug!(
            "Worker {} scanning frames {range} with step {step}",
            self.job.worker_id
        );
        source.seek(range.start)?;

        let mut frame_index = range.start;
        while frame_index < range.end {
            if self.is_cancelled() {
                finalize(state, started, progress)?;
                return Err(ExtractError::Cancelled);
            }
            if !source.grab()? {
                log::debug!(
                    "Worker {}: source exhausted at frame {frame_index}",
                    self.job.worker_id
                );
                break;
            }

            if sampling::is_candidate(frame_index, step) {
                let frame = source.retrieve()?;
                state.candidates_scored += 1;
                if self.scorer.accepts(self.scorer.score(&frame)) {
                    save_frame(&frame, &self.job.output_dir, frame_index)?;
                    state.frames_saved += 1;
                }
            }

            frame_index += 1;
            state.frames_examined += 1;
            if state.frames_examined % self.publish_interval == 0 {
                state.elapsed_seconds = started.elapsed().as_secs_f64();
                progress.publish(&state)?;
            }
        }

        finalize(state, started, progress)
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

fn finalize(
    mut state: WorkerProgress,
    started: Instant,
    progress: &mut dyn PublishProgress,
) -> Result<WorkerProgress, ExtractError> {
    state.elapsed_seconds = started.elapsed().as_secs_f64();
    state.finished = true;
    progress.publish(&state)?;
    Ok(state)
}

/// `frame_000123.jpg` for index 123.
pub fn frame_file_name(frame_index: u64) -> String {
    format!("frame_{frame_index:06}.jpg")
}

/// Inverse of [`frame_file_name`]. Anything else is `None`.
///
/// ```
/// use framesieve::parse_frame_file_name;
///
/// assert_eq!(parse_frame_file_name("frame_000123.jpg"), Some(123));
/// assert_eq!(parse_frame_file_name("frame_1234567.jpg"), Some(1_234_567));
/// assert_eq!(parse_frame_file_name("holiday.jpg"), None);
/// assert_eq!(parse_frame_file_name("frame_000123.jpg.part"), None);
/// ```
pub fn parse_frame_file_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("frame_")?.strip_suffix(".jpg")?;
    if digits.len() < 6 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Count frame files in `dir`, optionally only those inside `range`.
///
/// Only names produced by [`frame_file_name`] are counted.
pub fn count_frame_files(dir: &Path, range: Option<FrameRange>) -> Result<u64, ExtractError> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(index) = entry.file_name().to_str().and_then(parse_frame_file_name) else {
            continue;
        };
        if range.is_none_or(|range| range.contains(index)) {
            count += 1;
        }
    }
    Ok(count)
}

/// Write `frame` as `frame_NNNNNN.jpg` unless that file already exists.
///
/// Returns `true` when a file was written. The image is encoded into a
/// `.part` file first, synced, and renamed into place.
pub fn save_frame(
    frame: &DynamicImage,
    output_dir: &Path,
    frame_index: u64,
) -> Result<bool, ExtractError> {
    let name = frame_file_name(frame_index);
    let target = output_dir.join(&name);
    if target.exists() {
        return Ok(false);
    }

    let partial = output_dir.join(format!("{name}.part"));
    let mut writer = BufWriter::new(File::create(&partial)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    match frame {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => {
            frame.write_with_encoder(encoder)?
        }
        _ => DynamicImage::ImageRgb8(frame.to_rgb8()).write_with_encoder(encoder)?,
    }
    let file = writer.into_inner().map_err(|error| error.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&partial, &target)?;
    Ok(true)
}
