//! Single-worker checkpointing.
//!
//! A single-worker run records the first unprocessed frame after every frame
//! it handles. A later run over the same video picks up from there unless the
//! reset flag is set.
//!
//! The checkpoint is a small JSON object:
//!
//! ```json
//! {
//!   "video_path": "input.mp4",
//!   "output_dir": "frames",
//!   "fps": 2,
//!   "blur_threshold": 40.0,
//!   "last_frame": 1200
//! }
//! ```

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::ExtractError, partition::FrameRange, worker::count_frame_files};

/// The persisted single-worker checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Video the run was reading.
    pub video_path: PathBuf,
    /// Directory accepted frames were written to.
    pub output_dir: PathBuf,
    /// Target output rate of the run.
    pub fps: u32,
    /// Blur threshold of the run.
    pub blur_threshold: f64,
    /// First frame index not yet processed.
    pub last_frame: u64,
}

/// Where a single-worker run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// First frame to process.
    pub start_frame: u64,
    /// Frames counted as already saved.
    pub saved: u64,
}

/// Loads and atomically saves [`SessionState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// A store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored checkpoint.
    ///
    /// A missing file is `None`. So is an unreadable or corrupt one, after a
    /// warning is logged.
    pub fn load(&self) -> Option<SessionState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                log::warn!(
                    "Ignoring unreadable session file {}: {error}",
                    self.path.display()
                );
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(error) => {
                log::warn!(
                    "Ignoring corrupt session file {}: {error}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Persist `state`.
    ///
    /// The record is written to a sibling temporary file and renamed over the
    /// checkpoint after being synced to disk, so a crash or power loss leaves
    /// either the old or the new record.
    pub fn save(&self, state: &SessionState) -> Result<(), ExtractError> {
        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        let mut file = fs::File::create(&temporary)?;
        serde_json::to_writer(&mut file, state)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temporary, &self.path)?;
        Ok(())
    }

    /// Remove the checkpoint if present.
    pub fn clear(&self) -> Result<(), ExtractError> {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }

    /// Decide where a run over `video_path` starts.
    ///
    /// Resumes from the stored `last_frame` when a checkpoint exists for the
    /// same video and `reset` is false; otherwise starts at 0. The initial
    /// saved count is the number of frame files in `output_dir` below the
    /// start frame; files at or past it are counted again as the run
    /// reaches them.
    pub fn resume_point(
        &self,
        video_path: &Path,
        output_dir: &Path,
        reset: bool,
    ) -> Result<ResumePoint, ExtractError> {
        let start_frame = match self.load() {
            Some(state) if !reset && state.video_path == video_path => state.last_frame,
            _ => 0,
        };
        let saved = count_frame_files(output_dir, Some(FrameRange::new(0, start_frame)))?;
        Ok(ResumePoint { start_frame, saved })
    }
}
