//! Run orchestration.
//!
//! [`RunCoordinator`] drives one extraction from validation to report:
//!
//! ```text
//! Idle -> Validating -> SingleWorkerRun | MultiWorkerRun -> Reporting -> Idle
//! ```
//!
//! Single-worker runs process the video on the calling thread and checkpoint
//! after every frame, so an interrupted run can be resumed. Multi-worker runs
//! partition the frame range, launch one worker per range through a
//! [`WorkerLauncher`], and observe them with a [`ProgressAggregator`] on a
//! separate thread.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesieve::{ExtractionConfig, ProgressCallback, ProgressEvent, RunCoordinator};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, event: &ProgressEvent) {
//!         println!("{event:?}");
//!     }
//! }
//!
//! let config = ExtractionConfig::new("input.mp4", "frames")
//!     .with_target_fps(2)
//!     .with_blur_threshold(40.0);
//!
//! let result = RunCoordinator::new(config)
//!     .with_progress(Arc::new(PrintProgress))
//!     .run()?;
//! println!("saved {} frames", result.total_saved);
//! # Ok::<(), framesieve::ExtractError>(())
//! ```

use std::{
    fs,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::{
    aggregator::{DEFAULT_BOOTSTRAP_INTERVAL, DEFAULT_POLL_INTERVAL, ProgressAggregator},
    config::ExtractionConfig,
    error::ExtractError,
    eta::EtaEstimator,
    launcher::{ThreadLauncher, WorkerAssignment, WorkerLauncher},
    partition::{FrameRange, partition},
    progress::{
        ActiveWorkers, CancellationToken, NoOpProgress, ProgressBoard, ProgressCallback,
        ProgressEvent, PublishProgress, WorkerProgress, percent_of,
    },
    report::{ExtractionResult, RunMode, WorkerResult},
    sampling,
    session::{SessionState, SessionStore},
    source::{FfmpegOpener, FrameSource, OpenSource},
    worker::{FrameWorker, WorkerJob},
};

/// Where a [`RunCoordinator`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not running.
    Idle,
    /// Checking the configuration and opening the video.
    Validating,
    /// One resumable worker is scanning the whole video.
    SingleWorkerRun,
    /// Parallel workers are scanning their ranges.
    MultiWorkerRun,
    /// Building the result and writing the CSV log.
    Reporting,
}

/// Drives a complete extraction run.
pub struct RunCoordinator {
    config: ExtractionConfig,
    progress: Arc<dyn ProgressCallback>,
    opener: Arc<dyn OpenSource>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    cancellation: CancellationToken,
    bootstrap_interval: Duration,
    poll_interval: Duration,
    state: RunState,
}

impl RunCoordinator {
    /// A coordinator with FFmpeg sources, in-process workers, and no
    /// progress reporting.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            progress: Arc::new(NoOpProgress),
            opener: Arc::new(FfmpegOpener),
            launcher: None,
            cancellation: CancellationToken::new(),
            bootstrap_interval: DEFAULT_BOOTSTRAP_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: RunState::Idle,
        }
    }

    /// Receive progress events.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Open videos through `opener`. In-process workers use it too unless a
    /// launcher is set.
    #[must_use]
    pub fn with_opener(mut self, opener: Arc<dyn OpenSource>) -> Self {
        self.opener = opener;
        self
    }

    /// Launch multi-worker runs through `launcher` instead of a
    /// [`ThreadLauncher`].
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Stop the run once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Override the aggregator's bootstrap and steady-state polling
    /// intervals.
    #[must_use]
    pub fn with_poll_intervals(mut self, bootstrap: Duration, steady: Duration) -> Self {
        self.bootstrap_interval = bootstrap;
        self.poll_interval = steady;
        self
    }

    /// The configuration this coordinator runs.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Current run state. [`RunState::Idle`] outside [`run`](Self::run).
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the extraction.
    ///
    /// # Errors
    ///
    /// [`ExtractError::InvalidConfiguration`] before anything is written if
    /// the configuration is rejected. Source, I/O, and session errors of a
    /// single-worker run, and [`ExtractError::Cancelled`] if the token fires.
    /// Failed workers of a multi-worker run are logged and reported with
    /// their last published progress rather than failing the run.
    pub fn run(&mut self) -> Result<ExtractionResult, ExtractError> {
        let outcome = self.execute();
        self.transition(RunState::Idle);
        outcome
    }

    fn execute(&mut self) -> Result<ExtractionResult, ExtractError> {
        self.transition(RunState::Validating);
        self.config.validate()?;
        fs::create_dir_all(&self.config.output_dir)?;
        log::debug!("Processing mode: {}", self.config.processing_mode);

        let source = self.opener.open(&self.config.video_path)?;
        let result = if self.config.multicore {
            let total_frames = source.frame_count();
            drop(source);
            self.transition(RunState::MultiWorkerRun);
            self.run_multi_worker(total_frames)?
        } else {
            self.transition(RunState::SingleWorkerRun);
            self.run_single_worker(source)?
        };

        self.transition(RunState::Reporting);
        self.report(&result)?;
        Ok(result)
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            log::debug!("Run state {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }

    fn status(&self, message: String) {
        log::info!("{message}");
        self.progress.on_progress(&ProgressEvent::Status(message));
    }

    fn job(&self, worker_id: usize, range: FrameRange) -> WorkerJob {
        WorkerJob::new(
            worker_id,
            &self.config.video_path,
            &self.config.output_dir,
            range,
        )
        .with_target_fps(self.config.target_fps)
        .with_blur_threshold(self.config.blur_threshold)
    }

    fn run_single_worker(
        &mut self,
        mut source: Box<dyn FrameSource>,
    ) -> Result<ExtractionResult, ExtractError> {
        let store = SessionStore::new(&self.config.session_file);
        let resume = store.resume_point(
            &self.config.video_path,
            &self.config.output_dir,
            self.config.reset,
        )?;
        let total_frames = source.frame_count();
        let step = sampling::step(source.frames_per_second(), self.config.target_fps);
        self.status(format!(
            "Starting from frame {} / {total_frames} | Saving every {step} frames",
            resume.start_frame
        ));

        let range = FrameRange::new(resume.start_frame, total_frames);
        let mut checkpoint = Checkpoint {
            store,
            session: SessionState {
                video_path: self.config.video_path.clone(),
                output_dir: self.config.output_dir.clone(),
                fps: self.config.target_fps,
                blur_threshold: self.config.blur_threshold,
                last_frame: resume.start_frame,
            },
            callback: Arc::clone(&self.progress),
            eta: EtaEstimator::new(),
            candidates_seen: 0,
            step,
            total_frames,
        };

        let progress = FrameWorker::new(self.job(0, range))
            .with_publish_interval(1)
            .with_cancellation(self.cancellation.clone())
            .run(&mut *source, &mut checkpoint)?;

        let mut worker = WorkerResult::from_progress(&progress);
        worker.saved_count += resume.saved;
        Ok(ExtractionResult::new(RunMode::SingleWorker, vec![worker]))
    }

    fn run_multi_worker(&mut self, total_frames: u64) -> Result<ExtractionResult, ExtractError> {
        let worker_count = self.config.worker_count;
        let ranges = partition(total_frames, worker_count);
        let (board, slots) = ProgressBoard::new(worker_count);
        let active = ActiveWorkers::new();
        let launcher = self
            .launcher
            .clone()
            .unwrap_or_else(|| Arc::new(ThreadLauncher::new(Arc::clone(&self.opener))));

        self.status(format!("Launching {worker_count} workers..."));
        self.progress
            .on_progress(&ProgressEvent::WorkersStarted { worker_count });

        let mut handles = Vec::with_capacity(worker_count);
        let mut not_started = Vec::new();
        for (slot, range) in slots.into_iter().zip(&ranges) {
            let worker_id = slot.worker_id();
            let assignment = WorkerAssignment {
                job: self.job(worker_id, *range),
                slot,
                guard: active.register(),
                cancellation: self.cancellation.clone(),
            };
            log::debug!("Launching worker {worker_id} for frames {range}");
            match launcher.launch(assignment) {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    log::warn!("{error}");
                    not_started.push(worker_id);
                }
            }
        }

        let aggregator = ProgressAggregator::new(board.clone(), active)
            .with_expected_ranges(ranges.clone())
            .with_output_dir(&self.config.output_dir)
            .with_skipped_workers(not_started)
            .with_bootstrap_interval(self.bootstrap_interval)
            .with_poll_interval(self.poll_interval);
        let callback = Arc::clone(&self.progress);

        let mut cancelled = false;
        thread::scope(|scope| {
            let observer = scope.spawn(|| aggregator.run(callback.as_ref()));
            for handle in handles {
                let worker_id = handle.worker_id();
                match handle.join() {
                    Ok(()) => log::debug!("Worker {worker_id} finished"),
                    Err(ExtractError::Cancelled) => cancelled = true,
                    Err(error) => log::warn!("{error}"),
                }
            }
            if observer.join().is_err() {
                log::warn!("Progress observer panicked; worker progress was not fully displayed");
            }
        });
        if cancelled || self.cancellation.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let workers = ranges
            .iter()
            .enumerate()
            .map(|(worker_id, range)| match board.get(worker_id) {
                Some(progress) => WorkerResult::from_progress(&progress),
                None => WorkerResult::missing(worker_id, *range),
            })
            .collect();
        Ok(ExtractionResult::new(
            RunMode::MultiWorker { worker_count },
            workers,
        ))
    }

    fn report(&self, result: &ExtractionResult) -> Result<(), ExtractError> {
        self.status(format!(
            "Done ({}). Total saved: {} frames.",
            result.mode, result.total_saved
        ));
        for line in result.summary_lines() {
            self.status(line);
        }

        if self.config.csv_log {
            result.write_csv_log(&self.config.csv_path)?;
            self.status(format!("Log saved as '{}'", self.config.csv_path.display()));
        }

        self.progress.on_progress(&ProgressEvent::Finished {
            total_saved: result.total_saved,
        });
        Ok(())
    }
}

/// Single-worker progress sink: checkpoints the session and reports overall
/// progress after every frame.
struct Checkpoint {
    store: SessionStore,
    session: SessionState,
    callback: Arc<dyn ProgressCallback>,
    eta: EtaEstimator,
    candidates_seen: u64,
    step: u64,
    total_frames: u64,
}

impl PublishProgress for Checkpoint {
    fn publish(&mut self, progress: &WorkerProgress) -> Result<(), ExtractError> {
        let current_frame = progress.range.start + progress.frames_examined;
        if progress.frames_examined == 0 {
            self.eta.mark_candidate(Instant::now());
        } else if progress.candidates_scored > self.candidates_seen {
            self.candidates_seen = progress.candidates_scored;
            self.eta.mark_candidate(Instant::now());
        }

        if current_frame != self.session.last_frame {
            self.session.last_frame = current_frame;
            self.store.save(&self.session)?;
        }

        let remaining =
            sampling::candidates_in(FrameRange::new(current_frame, self.total_frames), self.step);
        self.callback.on_progress(&ProgressEvent::Overall {
            percent: percent_of(current_frame, self.total_frames),
            eta: self.eta.estimate(remaining),
            current_frame,
            total_frames: self.total_frames,
        });
        Ok(())
    }
}
