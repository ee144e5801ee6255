//! Run results, summary lines, and the CSV log.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{error::ExtractError, partition::FrameRange, progress::WorkerProgress};

/// Header row of the CSV log.
pub const CSV_HEADER: &str = "Worker,Start Frame,End Frame,Saved Frames,Total Processed,Time (s)";

/// How a run was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One resumable worker on the calling thread.
    SingleWorker,
    /// The frame range split across parallel workers.
    MultiWorker {
        /// Number of workers launched.
        worker_count: usize,
    },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::SingleWorker => write!(f, "single worker"),
            RunMode::MultiWorker { worker_count } => write!(f, "{worker_count} workers"),
        }
    }
}

/// Final statistics of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    /// Worker id, 0 in single-worker mode.
    pub worker_id: usize,
    /// Frames the worker was assigned.
    pub range: FrameRange,
    /// Accepted frames, including ones whose file already existed.
    pub saved_count: u64,
    /// Frames read from the source.
    pub frames_processed: u64,
    /// Wall-clock seconds, rounded to hundredths.
    pub elapsed_seconds: f64,
    /// `false` when the worker died before finalizing its progress. The
    /// counts are then its last publication.
    pub completed: bool,
}

impl WorkerResult {
    /// Build a result from a worker's last publication.
    pub fn from_progress(progress: &WorkerProgress) -> Self {
        Self {
            worker_id: progress.worker_id,
            range: progress.range,
            saved_count: progress.frames_saved,
            frames_processed: progress.frames_examined,
            elapsed_seconds: round_hundredths(progress.elapsed_seconds),
            completed: progress.finished,
        }
    }

    /// A worker that never published anything.
    pub fn missing(worker_id: usize, range: FrameRange) -> Self {
        Self {
            worker_id,
            range,
            saved_count: 0,
            frames_processed: 0,
            elapsed_seconds: 0.0,
            completed: false,
        }
    }

    /// `[Worker 0] Frames 0-250 | Saved: 12 | Time: 3.4s`
    pub fn summary_line(&self) -> String {
        format!(
            "[Worker {}] Frames {} | Saved: {} | Time: {}s",
            self.worker_id, self.range, self.saved_count, self.elapsed_seconds
        )
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.worker_id,
            self.range.start,
            self.range.end,
            self.saved_count,
            self.frames_processed,
            self.elapsed_seconds
        )
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// How the run was executed.
    pub mode: RunMode,
    /// One entry per worker, ordered by id. Single-worker runs have one.
    pub workers: Vec<WorkerResult>,
    /// Accepted frames across all workers.
    pub total_saved: u64,
}

impl ExtractionResult {
    /// Assemble a result, summing the saved counts.
    pub fn new(mode: RunMode, workers: Vec<WorkerResult>) -> Self {
        let total_saved = workers.iter().map(|worker| worker.saved_count).sum();
        Self {
            mode,
            workers,
            total_saved,
        }
    }

    /// Frames read across all workers.
    pub fn frames_processed(&self) -> u64 {
        self.workers.iter().map(|worker| worker.frames_processed).sum()
    }

    /// Whether every worker finalized its progress.
    pub fn all_completed(&self) -> bool {
        self.workers.iter().all(|worker| worker.completed)
    }

    /// One human-readable line per worker.
    pub fn summary_lines(&self) -> Vec<String> {
        self.workers.iter().map(WorkerResult::summary_line).collect()
    }

    /// Write the CSV log to `path`, replacing any previous file.
    pub fn write_csv_log(&self, path: &Path) -> Result<(), ExtractError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{CSV_HEADER}")?;
        for worker in &self.workers {
            writeln!(writer, "{}", worker.csv_row())?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub(crate) fn round_hundredths(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
