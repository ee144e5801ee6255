//! Multi-worker progress observation.
//!
//! The [`ProgressAggregator`] runs on its own thread while workers are alive.
//! It first waits (bounded polling) until every worker has published its
//! range, then repeatedly turns the [`ProgressBoard`] snapshot into one
//! [`ProgressEvent::Worker`] per worker.
//!
//! A worker with no publication yet is shown as
//! [`WorkerStatus::Starting`], unless its range is known from the partition
//! and an output directory is set: then the frame files already written in
//! that range stand in for its progress.

use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use crate::{
    partition::FrameRange,
    progress::{
        ActiveWorkers, ProgressBoard, ProgressCallback, ProgressEvent, WorkerStatus, percent_of,
    },
    worker::count_frame_files,
};

/// Polling interval while waiting for every worker's first publication.
pub const DEFAULT_BOOTSTRAP_INTERVAL: Duration = Duration::from_millis(200);

/// Polling interval once all workers are running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Turns published worker progress into display events.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    board: ProgressBoard,
    active: ActiveWorkers,
    expected_ranges: Vec<FrameRange>,
    skipped: Vec<usize>,
    output_dir: Option<PathBuf>,
    bootstrap_interval: Duration,
    poll_interval: Duration,
}

impl ProgressAggregator {
    /// Observe `board` while `active` has live workers, with default intervals.
    pub fn new(board: ProgressBoard, active: ActiveWorkers) -> Self {
        Self {
            board,
            active,
            expected_ranges: Vec::new(),
            skipped: Vec::new(),
            output_dir: None,
            bootstrap_interval: DEFAULT_BOOTSTRAP_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Ranges the workers were assigned, indexed by worker id.
    #[must_use]
    pub fn with_expected_ranges(mut self, ranges: Vec<FrameRange>) -> Self {
        self.expected_ranges = ranges;
        self
    }

    /// Workers that never started. The bootstrap phase does not wait for
    /// their first publication.
    #[must_use]
    pub fn with_skipped_workers(mut self, worker_ids: Vec<usize>) -> Self {
        self.skipped = worker_ids;
        self
    }

    /// Directory to count frame files in for workers that have not
    /// published.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set how often the bootstrap phase polls.
    #[must_use]
    pub fn with_bootstrap_interval(mut self, interval: Duration) -> Self {
        self.bootstrap_interval = interval;
        self
    }

    /// Set how often steady-state ticks are pushed.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Block until every started worker has published or none is alive.
    ///
    /// Returns `true` if every slot not marked as skipped has a publication.
    pub fn wait_for_ranges(&self) -> bool {
        let started = Instant::now();
        loop {
            if self.all_ranges_published() {
                log::debug!("All worker ranges published after {:?}", started.elapsed());
                return true;
            }
            if !self.active.any_alive() {
                log::debug!(
                    "No workers alive; {} of {} ranges published",
                    self.board.published_count(),
                    self.board.len()
                );
                return self.all_ranges_published();
            }
            thread::sleep(self.bootstrap_interval);
        }
    }

    fn all_ranges_published(&self) -> bool {
        self.board
            .snapshot()
            .iter()
            .enumerate()
            .all(|(worker_id, slot)| slot.is_some() || self.skipped.contains(&worker_id))
    }

    /// Current status of every worker, indexed by id.
    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.board
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(worker_id, slot)| match slot {
                Some(progress) => progress.status(),
                None => self.fallback_status(worker_id),
            })
            .collect()
    }

    /// Push one [`ProgressEvent::Worker`] per worker to `callback`.
    pub fn tick(&self, callback: &dyn ProgressCallback) {
        for (worker_id, status) in self.statuses().into_iter().enumerate() {
            callback.on_progress(&ProgressEvent::Worker { worker_id, status });
        }
    }

    /// Observe until no worker is alive, then publish a last tick.
    pub fn run(&self, callback: &dyn ProgressCallback) {
        self.wait_for_ranges();
        while self.active.any_alive() {
            self.tick(callback);
            thread::sleep(self.poll_interval);
        }
        self.tick(callback);
    }

    fn fallback_status(&self, worker_id: usize) -> WorkerStatus {
        let (Some(range), Some(output_dir)) =
            (self.expected_ranges.get(worker_id), self.output_dir.as_ref())
        else {
            return WorkerStatus::Starting;
        };

        match count_frame_files(output_dir, Some(*range)) {
            Ok(done) => WorkerStatus::Running {
                percent: percent_of(done, range.len()),
                done,
                total: range.len(),
            },
            Err(error) => {
                log::debug!("Listing {} failed, retrying: {error}", output_dir.display());
                WorkerStatus::Starting
            }
        }
    }
}
