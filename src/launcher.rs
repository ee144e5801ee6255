//! Worker launchers.
//!
//! A [`WorkerLauncher`] starts one worker for a [`WorkerAssignment`] and
//! returns a [`WorkerHandle`] to join it. Two launchers ship with the crate:
//!
//! - [`ThreadLauncher`] runs each worker on its own thread in this process.
//!   It is the library default.
//! - [`ProcessLauncher`] re-executes a binary (normally the running
//!   `framesieve` executable with its hidden `worker` subcommand) once per
//!   worker. The child prints its progress as JSON lines on stdout and a
//!   reader thread relays them into the worker's [`ProgressSlot`].
//!
//! Either way the assignment's [`ActiveGuard`] lives exactly as long as the
//! worker, so a crashed or panicking worker is seen as gone.

use std::{
    any::Any,
    ffi::OsString,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::{
    error::ExtractError,
    progress::{ActiveGuard, CancellationToken, ProgressSlot, PublishProgress, WorkerProgress},
    source::{FfmpegOpener, OpenSource},
    worker::{FrameWorker, WorkerJob},
};

/// Everything handed to a launcher for one worker.
pub struct WorkerAssignment {
    /// What to process.
    pub job: WorkerJob,
    /// The worker's only progress writer.
    pub slot: ProgressSlot,
    /// Held until the worker terminates.
    pub guard: ActiveGuard,
    /// Stops the worker between frames.
    pub cancellation: CancellationToken,
}

/// Starts workers.
pub trait WorkerLauncher: Send + Sync {
    /// Start the worker described by `assignment`.
    ///
    /// # Errors
    ///
    /// [`ExtractError::WorkerLaunch`] if the worker could not be started.
    fn launch(&self, assignment: WorkerAssignment) -> Result<WorkerHandle, ExtractError>;
}

/// Joinable handle to a running worker.
pub struct WorkerHandle {
    worker_id: usize,
    thread: JoinHandle<Result<(), ExtractError>>,
}

impl WorkerHandle {
    /// Wrap the thread driving worker `worker_id`.
    pub fn new(worker_id: usize, thread: JoinHandle<Result<(), ExtractError>>) -> Self {
        Self { worker_id, thread }
    }

    /// Id of the worker behind this handle.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Wait for the worker. A panic becomes [`ExtractError::WorkerFailed`].
    pub fn join(self) -> Result<(), ExtractError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(payload) => Err(ExtractError::WorkerFailed {
                worker_id: self.worker_id,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

fn spawn_named<F>(worker_id: usize, body: F) -> Result<WorkerHandle, ExtractError>
where
    F: FnOnce() -> Result<(), ExtractError> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("framesieve-worker-{worker_id}"))
        .spawn(body)
        .map(|thread| WorkerHandle::new(worker_id, thread))
        .map_err(|error| ExtractError::WorkerLaunch {
            worker_id,
            reason: error.to_string(),
        })
}

/// Runs each worker on a dedicated thread, opening its own source.
#[derive(Clone)]
pub struct ThreadLauncher {
    opener: Arc<dyn OpenSource>,
}

impl ThreadLauncher {
    /// Open each worker's source through `opener`.
    pub fn new(opener: Arc<dyn OpenSource>) -> Self {
        Self { opener }
    }
}

impl Default for ThreadLauncher {
    fn default() -> Self {
        Self::new(Arc::new(FfmpegOpener))
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, assignment: WorkerAssignment) -> Result<WorkerHandle, ExtractError> {
        let WorkerAssignment {
            job,
            mut slot,
            guard,
            cancellation,
        } = assignment;
        let worker_id = job.worker_id;
        let opener = Arc::clone(&self.opener);

        spawn_named(worker_id, move || {
            let _guard = guard;
            let mut source = opener.open(&job.video_path)?;
            FrameWorker::new(job)
                .with_cancellation(cancellation)
                .run(&mut *source, &mut slot)
                .map(|_| ())
        })
    }
}

/// Runs each worker as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ProcessLauncher {
    /// Launch `program` with [`worker_arguments`] for each job.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// The running executable's `worker` subcommand.
    pub fn current_exe() -> Result<Self, ExtractError> {
        Ok(Self::new(std::env::current_exe()?).with_args(["worker"]))
    }

    /// Arguments placed before the job arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, assignment: WorkerAssignment) -> Result<WorkerHandle, ExtractError> {
        let WorkerAssignment {
            job,
            mut slot,
            guard,
            cancellation,
        } = assignment;
        let worker_id = job.worker_id;
        let launch_error = |reason: String| ExtractError::WorkerLaunch { worker_id, reason };

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(worker_arguments(&job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|error| launch_error(error.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error("child stdout was not captured".to_string()))?;
        log::debug!("Worker {worker_id} started as process {}", child.id());

        spawn_named(worker_id, move || {
            let _guard = guard;
            let outcome = relay_progress(worker_id, BufReader::new(stdout), &mut slot, &cancellation);
            if !matches!(outcome, Ok(Relay::Closed)) {
                kill(worker_id, &mut child);
            }
            let status = child.wait()?;
            match outcome? {
                Relay::Cancelled => Err(ExtractError::Cancelled),
                Relay::Closed if status.success() => Ok(()),
                Relay::Closed => Err(ExtractError::WorkerFailed {
                    worker_id,
                    reason: format!("process {status}"),
                }),
            }
        })
    }
}

fn kill(worker_id: usize, child: &mut Child) {
    if let Err(error) = child.kill() {
        log::debug!("Could not kill worker {worker_id}: {error}");
    }
}

/// Command-line arguments of the `worker` subcommand for `job`.
///
/// The video path follows `--`, so paths starting with `-` stay positional.
pub fn worker_arguments(job: &WorkerJob) -> Vec<OsString> {
    vec![
        "--id".into(),
        job.worker_id.to_string().into(),
        "--start".into(),
        job.range.start.to_string().into(),
        "--end".into(),
        job.range.end.to_string().into(),
        "--fps".into(),
        job.target_fps.to_string().into(),
        "--blur-threshold".into(),
        job.blur_threshold.to_string().into(),
        "--out".into(),
        job.output_dir.clone().into(),
        "--".into(),
        job.video_path.clone().into(),
    ]
}

/// Why [`relay_progress`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// The stream ended.
    Closed,
    /// The token was cancelled.
    Cancelled,
}

/// Forward JSON-line progress from `reader` into `sink` until the stream
/// ends or `cancellation` fires.
///
/// Lines that are not a [`WorkerProgress`] for `worker_id` are logged and
/// skipped.
pub fn relay_progress(
    worker_id: usize,
    reader: impl BufRead,
    sink: &mut dyn PublishProgress,
    cancellation: &CancellationToken,
) -> Result<Relay, ExtractError> {
    for line in reader.lines() {
        if cancellation.is_cancelled() {
            return Ok(Relay::Cancelled);
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<WorkerProgress>(&line) {
            Ok(progress) if progress.worker_id == worker_id => sink.publish(&progress)?,
            Ok(progress) => log::warn!(
                "{}",
                ExtractError::WorkerProtocol {
                    worker_id,
                    reason: format!("progress for worker {}", progress.worker_id),
                }
            ),
            Err(error) => log::warn!(
                "{}",
                ExtractError::WorkerProtocol {
                    worker_id,
                    reason: error.to_string(),
                }
            ),
        }
    }
    Ok(Relay::Closed)
}

/// Publishes progress as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesPublisher<W> {
    /// Write progress lines to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PublishProgress for JsonLinesPublisher<W> {
    fn publish(&mut self, progress: &WorkerProgress) -> Result<(), ExtractError> {
        serde_json::to_writer(&mut self.writer, progress)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Body of a worker process: run `job` and stream progress to stdout.
pub fn run_worker_process(
    job: WorkerJob,
    opener: &dyn OpenSource,
) -> Result<WorkerProgress, ExtractError> {
    let mut source = opener.open(&job.video_path)?;
    let mut publisher = JsonLinesPublisher::new(io::stdout().lock());
    FrameWorker::new(job).run(&mut *source, &mut publisher)
}
