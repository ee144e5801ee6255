//! Run configuration.
//!
//! [`ExtractionConfig`] is an immutable value built once per run. The
//! `with_*` methods consume and return the config, so a run can never observe
//! a half-edited value.
//!
//! # Example
//!
//! ```
//! use framesieve::ExtractionConfig;
//!
//! let config = ExtractionConfig::new("input.mp4", "frames")
//!     .with_target_fps(2)
//!     .with_blur_threshold(40.0)
//!     .with_multicore(true)
//!     .with_worker_count(8);
//!
//! assert_eq!(config.worker_count(), 8);
//! assert!(config.validate().is_err()); // input.mp4 does not exist
//! ```

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::ExtractError;

/// Default location of the single-worker checkpoint, relative to the working
/// directory.
pub const DEFAULT_SESSION_FILE: &str = "session.json";

/// Default location of the CSV run log, relative to the working directory.
pub const DEFAULT_CSV_LOG: &str = "log.csv";

/// Worker counts offered by the command-line front end.
pub const WORKER_COUNT_CHOICES: [usize; 3] = [4, 8, 16];

/// Requested processing backend.
///
/// Reserved: the value is carried through a run and logged, but every mode
/// currently decodes and scores on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Decode and score on the CPU. This is the default.
    #[default]
    Cpu,
    /// Reserved for GPU decoding.
    Gpu,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Cpu => write!(f, "CPU"),
            ProcessingMode::Gpu => write!(f, "GPU"),
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(ProcessingMode::Cpu),
            "gpu" => Ok(ProcessingMode::Gpu),
            other => Err(ExtractError::InvalidConfiguration(format!(
                "unknown processing mode: {other}"
            ))),
        }
    }
}

/// Everything a run needs to know, fixed before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub(crate) video_path: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) target_fps: u32,
    pub(crate) blur_threshold: f64,
    pub(crate) reset: bool,
    pub(crate) multicore: bool,
    pub(crate) worker_count: usize,
    pub(crate) csv_log: bool,
    pub(crate) processing_mode: ProcessingMode,
    pub(crate) session_file: PathBuf,
    pub(crate) csv_path: PathBuf,
}

impl ExtractionConfig {
    /// Create a configuration for extracting `video_path` into `output_dir`.
    ///
    /// Defaults: 30 fps target, blur threshold 5.0, no reset, single worker
    /// mode (4 workers when multicore is enabled), no CSV log, CPU mode,
    /// [`DEFAULT_SESSION_FILE`] and [`DEFAULT_CSV_LOG`].
    pub fn new(video_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            output_dir: output_dir.into(),
            target_fps: 30,
            blur_threshold: 5.0,
            reset: false,
            multicore: false,
            worker_count: 4,
            csv_log: false,
            processing_mode: ProcessingMode::Cpu,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            csv_path: PathBuf::from(DEFAULT_CSV_LOG),
        }
    }

    /// Set the desired output rate in frames per second.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the sharpness threshold. Frames must score strictly above it.
    #[must_use]
    pub fn with_blur_threshold(mut self, threshold: f64) -> Self {
        self.blur_threshold = threshold;
        self
    }

    /// Ignore any saved session and start from frame 0.
    #[must_use]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Split the video across [`worker_count`](Self::with_worker_count)
    /// parallel workers instead of the resumable single-worker mode.
    #[must_use]
    pub fn with_multicore(mut self, multicore: bool) -> Self {
        self.multicore = multicore;
        self
    }

    /// Set the number of workers used in multicore mode.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Write a CSV summary when the run finishes.
    #[must_use]
    pub fn with_csv_log(mut self, enabled: bool) -> Self {
        self.csv_log = enabled;
        self
    }

    /// Set the (reserved) processing mode.
    #[must_use]
    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    /// Override where the single-worker checkpoint is stored.
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }

    /// Override where the CSV log is written.
    #[must_use]
    pub fn with_csv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.csv_path = path.into();
        self
    }

    /// Input video.
    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    /// Directory accepted frames are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Desired output rate.
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Minimum sharpness, exclusive.
    pub fn blur_threshold(&self) -> f64 {
        self.blur_threshold
    }

    /// Whether a saved session is ignored.
    pub fn reset(&self) -> bool {
        self.reset
    }

    /// Whether the run is split across workers.
    pub fn multicore(&self) -> bool {
        self.multicore
    }

    /// Workers used in multicore mode.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether a CSV summary is written.
    pub fn csv_log(&self) -> bool {
        self.csv_log
    }

    /// Requested processing backend.
    pub fn processing_mode(&self) -> ProcessingMode {
        self.processing_mode
    }

    /// Single-worker checkpoint path.
    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    /// CSV log path.
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Check the configuration without touching the filesystem beyond
    /// opening the video for reading.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidConfiguration`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let invalid = |reason: String| Err(ExtractError::InvalidConfiguration(reason));

        if self.output_dir.as_os_str().is_empty() {
            return invalid("output directory is not set".to_string());
        }
        if !self.video_path.is_file() || File::open(&self.video_path).is_err() {
            return invalid(format!(
                "video path {} is not a readable file",
                self.video_path.display()
            ));
        }
        if self.target_fps == 0 {
            return invalid("target fps must be greater than zero".to_string());
        }
        if !self.blur_threshold.is_finite() || self.blur_threshold < 0.0 {
            return invalid(format!(
                "blur threshold must be a non-negative number, got {}",
                self.blur_threshold
            ));
        }
        if self.multicore && self.worker_count == 0 {
            return invalid("worker count must be greater than zero".to_string());
        }
        Ok(())
    }
}
