//! Progress publishing, display events, and cancellation.
//!
//! Workers own their progress: each one holds the only [`ProgressSlot`] for
//! its id and publishes [`WorkerProgress`] snapshots into it. The
//! [`ProgressBoard`] side is read-only and is what the
//! [`ProgressAggregator`](crate::ProgressAggregator) polls.
//!
//! Everything user-facing leaves the engine as a [`ProgressEvent`] delivered
//! to a [`ProgressCallback`]. The display layer never reaches back into the
//! engine.
//!
//! # Example
//!
//! ```
//! use framesieve::{FrameRange, ProgressBoard, PublishProgress, WorkerProgress};
//!
//! let (board, mut slots) = ProgressBoard::new(2);
//! let mut progress = WorkerProgress::started(1, FrameRange::new(50, 100));
//! progress.frames_examined = 10;
//! slots[1].publish(&progress)?;
//!
//! let snapshot = board.snapshot();
//! assert!(snapshot[0].is_none());
//! assert_eq!(snapshot[1].as_ref().map(|p| p.percent()), Some(20));
//! # Ok::<(), framesieve::ExtractError>(())
//! ```

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{error::ExtractError, partition::FrameRange};

/// One worker's published state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerProgress {
    /// Id of the owning worker.
    pub worker_id: usize,
    /// Frames assigned to the worker.
    pub range: FrameRange,
    /// Frames read from the source so far, candidates or not.
    pub frames_examined: u64,
    /// Candidate frames that were scored.
    pub candidates_scored: u64,
    /// Accepted frames, including ones whose file already existed.
    pub frames_saved: u64,
    /// Wall-clock seconds since the worker started.
    pub elapsed_seconds: f64,
    /// Set on the final publication.
    pub finished: bool,
}

impl WorkerProgress {
    /// The first publication of a worker: its range and nothing done yet.
    pub fn started(worker_id: usize, range: FrameRange) -> Self {
        Self {
            worker_id,
            range,
            frames_examined: 0,
            candidates_scored: 0,
            frames_saved: 0,
            elapsed_seconds: 0.0,
            finished: false,
        }
    }

    /// `frames_examined / range.len() * 100`, truncated and clamped.
    pub fn percent(&self) -> u8 {
        percent_of(self.frames_examined, self.range.len())
    }

    /// Display status for this snapshot.
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::Running {
            percent: self.percent(),
            done: self.frames_examined,
            total: self.range.len(),
        }
    }
}

/// `done / total * 100`, truncated to an integer and clamped to 100.
///
/// A zero total is 0%.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as u128 * 100) / total as u128).min(100) as u8
}

/// Sink for a worker's own progress.
///
/// A failed publication stops the worker.
pub trait PublishProgress {
    /// Replace the worker's published state with `progress`.
    fn publish(&mut self, progress: &WorkerProgress) -> Result<(), ExtractError>;
}

type Slots = Arc<[Mutex<Option<WorkerProgress>>]>;

/// Read side of the per-worker progress store.
///
/// Cloning the board shares the same slots.
#[derive(Clone)]
pub struct ProgressBoard {
    slots: Slots,
}

/// Write side of one slot. There is exactly one per worker id and it cannot
/// be cloned, so each slot has a single writer.
pub struct ProgressSlot {
    worker_id: usize,
    slots: Slots,
}

impl ProgressBoard {
    /// Create a board with `worker_count` empty slots and the matching
    /// writers, indexed by worker id.
    pub fn new(worker_count: usize) -> (Self, Vec<ProgressSlot>) {
        let slots: Slots = (0..worker_count).map(|_| Mutex::new(None)).collect();
        let writers = (0..worker_count)
            .map(|worker_id| ProgressSlot {
                worker_id,
                slots: Arc::clone(&slots),
            })
            .collect();
        (Self { slots }, writers)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the board has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Latest publication of `worker_id`, if any.
    pub fn get(&self, worker_id: usize) -> Option<WorkerProgress> {
        self.slots.get(worker_id).and_then(|slot| {
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Latest publication of every worker, indexed by id.
    pub fn snapshot(&self) -> Vec<Option<WorkerProgress>> {
        (0..self.slots.len()).map(|id| self.get(id)).collect()
    }

    /// How many workers have published at least once.
    pub fn published_count(&self) -> usize {
        self.snapshot().iter().filter(|slot| slot.is_some()).count()
    }
}

impl fmt::Debug for ProgressBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBoard")
            .field("slots", &self.slots.len())
            .field("published", &self.published_count())
            .finish()
    }
}

impl ProgressSlot {
    /// Id of the worker this slot belongs to.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }
}

impl PublishProgress for ProgressSlot {
    fn publish(&mut self, progress: &WorkerProgress) -> Result<(), ExtractError> {
        if let Some(slot) = self.slots.get(self.worker_id) {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(progress.clone());
        }
        Ok(())
    }
}

/// Count of workers that have not yet terminated.
///
/// Each running worker holds an [`ActiveGuard`]; dropping it (normal exit,
/// error, or unwinding panic) marks the worker as gone.
#[derive(Debug, Clone, Default)]
pub struct ActiveWorkers {
    count: Arc<AtomicUsize>,
}

/// Keeps one worker counted as alive until dropped.
#[derive(Debug)]
pub struct ActiveGuard {
    count: Arc<AtomicUsize>,
}

impl ActiveWorkers {
    /// A counter with no live workers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one more worker as alive.
    pub fn register(&self) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        ActiveGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of live workers.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether at least one worker is still live.
    pub fn any_alive(&self) -> bool {
        self.count() > 0
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// How a worker is shown in the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Nothing published yet.
    Starting,
    /// `done` of `total` frames handled.
    Running {
        /// Integer percentage, 0–100.
        percent: u8,
        /// Numerator of the fraction.
        done: u64,
        /// Denominator of the fraction.
        total: u64,
    },
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Starting => write!(f, "Starting..."),
            WorkerStatus::Running {
                percent,
                done,
                total,
            } => write!(f, "{percent}% | {done} / {total}"),
        }
    }
}

/// Something the display layer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A one-line status or log message.
    Status(String),
    /// A multi-worker run is starting with this many workers.
    WorkersStarted {
        /// Number of worker slots to show.
        worker_count: usize,
    },
    /// Refreshed view of one worker.
    Worker {
        /// Worker id.
        worker_id: usize,
        /// Current status.
        status: WorkerStatus,
    },
    /// Refreshed single-worker view.
    Overall {
        /// Integer percentage, 0–100.
        percent: u8,
        /// Estimated time remaining, once there is enough history.
        eta: Option<Duration>,
        /// First frame not yet processed.
        current_frame: u64,
        /// Total frames in the video.
        total_frames: u64,
    },
    /// The run is complete.
    Finished {
        /// Accepted frames across all workers.
        total_saved: u64,
    },
}

/// Receives [`ProgressEvent`]s.
///
/// Implementations must be [`Send`] and [`Sync`]: in multi-worker runs the
/// events come from the aggregator's observation thread.
///
/// Callbacks are **infallible**. They observe the run but cannot influence
/// it; use [`CancellationToken`] to stop one.
pub trait ProgressCallback: Send + Sync {
    /// Handle one event.
    fn on_progress(&self, event: &ProgressEvent);
}

/// Discards every event. The default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state. Workers check it between frames.
///
/// ```
/// use framesieve::CancellationToken;
///
/// let token = CancellationToken::new();
/// let clone = token.clone();
/// token.cancel();
/// assert!(clone.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
