//! # framesieve
//!
//! Extract the sharp frames of a video at a target sampling rate.
//!
//! `framesieve` samples every Nth frame of a video, scores each sample with
//! the variance of its Laplacian, and writes the ones above a blur threshold
//! to `frame_NNNNNN.jpg` files named by absolute frame index. Decoding is
//! done by FFmpeg via the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)
//! crate.
//!
//! ## Quick Start
//!
//! ### Single worker, resumable
//!
//! ```no_run
//! use framesieve::{ExtractionConfig, RunCoordinator};
//!
//! let config = ExtractionConfig::new("input.mp4", "frames")
//!     .with_target_fps(2)
//!     .with_blur_threshold(40.0);
//!
//! let result = RunCoordinator::new(config).run().unwrap();
//! println!("saved {} frames", result.total_saved);
//! ```
//!
//! Interrupt the run and start it again: it resumes from the checkpoint in
//! `session.json` unless [`with_reset`](ExtractionConfig::with_reset) is set.
//!
//! ### Several workers
//!
//! ```no_run
//! use framesieve::{ExtractionConfig, RunCoordinator};
//!
//! let config = ExtractionConfig::new("input.mp4", "frames")
//!     .with_multicore(true)
//!     .with_worker_count(8)
//!     .with_csv_log(true);
//!
//! let result = RunCoordinator::new(config).run().unwrap();
//! for line in result.summary_lines() {
//!     println!("{line}");
//! }
//! ```
//!
//! ### Scoring a single image
//!
//! ```no_run
//! use framesieve::BlurScorer;
//!
//! let image = image::open("photo.jpg").unwrap();
//! let scorer = BlurScorer::new(40.0);
//! let sharpness = scorer.score(&image);
//! println!("{sharpness:.1} -> keep: {}", scorer.accepts(sharpness));
//! ```
//!
//! ## Features
//!
//! - **Frame sampling** on one grid anchored at frame 0, regardless of how
//!   the video is split across workers
//! - **Blur filtering** with Laplacian variance, matching OpenCV scores
//! - **Parallel workers** as threads ([`ThreadLauncher`]) or child processes
//!   ([`ProcessLauncher`])
//! - **Resumable single-worker runs** via an atomically rewritten checkpoint
//! - **Progress & cancellation**: per-worker and overall progress events
//!   with ETA, and a cooperative [`CancellationToken`]
//! - **CSV run log** with one row per worker
//!
//! ## Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Accumulate the Laplacian of each frame row-parallel |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system. See the
//! README for platform-specific instructions.

#![warn(missing_docs)]

pub mod aggregator;
pub mod blur;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod eta;
pub mod launcher;
pub mod partition;
pub mod progress;
pub mod report;
pub mod sampling;
pub mod session;
pub mod source;
mod utilities;
pub mod worker;

pub use aggregator::ProgressAggregator;
pub use blur::{BlurScorer, accept, sharpness};
pub use config::{ExtractionConfig, ProcessingMode};
pub use coordinator::{RunCoordinator, RunState};
pub use error::ExtractError;
pub use eta::{EtaEstimator, format_eta};
pub use launcher::{
    JsonLinesPublisher, ProcessLauncher, ThreadLauncher, WorkerAssignment, WorkerHandle,
    WorkerLauncher, run_worker_process,
};
pub use partition::{FrameRange, partition};
pub use progress::{
    ActiveGuard, ActiveWorkers, CancellationToken, ProgressBoard, ProgressCallback,
    ProgressEvent, ProgressSlot, PublishProgress, WorkerProgress, WorkerStatus,
};
pub use report::{ExtractionResult, RunMode, WorkerResult};
pub use session::{SessionState, SessionStore};
pub use source::{
    DecoderLogLevel, FfmpegOpener, FrameSource, OpenSource, VideoFile, set_decoder_log_level,
};
pub use worker::{FrameWorker, WorkerJob, frame_file_name, parse_frame_file_name};
