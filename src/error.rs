//! Error types for the `framesieve` crate.
//!
//! This module defines [`ExtractError`], the unified error type returned by
//! every fallible operation in the crate. Variants carry enough context
//! (paths, worker ids, upstream messages) to diagnose a failure without
//! extra logging at the call site.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framesieve` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExtractError {
    /// The run configuration was rejected before any work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The video file could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the opener.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// [`FrameSource::retrieve`](crate::FrameSource::retrieve) was called
    /// without a successfully grabbed frame.
    #[error("No frame has been grabbed")]
    NothingGrabbed,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An accepted frame could not be encoded as an image file.
    #[error("Image encoding error: {0}")]
    ImageError(#[from] ImageError),

    /// The session checkpoint or a progress message could not be
    /// (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A worker could not be started.
    #[error("Failed to launch worker {worker_id}: {reason}")]
    WorkerLaunch {
        /// Id of the worker that failed to start.
        worker_id: usize,
        /// Underlying reason.
        reason: String,
    },

    /// A worker process emitted something that is not a progress message.
    #[error("Worker {worker_id} sent a malformed progress message: {reason}")]
    WorkerProtocol {
        /// Id of the misbehaving worker.
        worker_id: usize,
        /// Underlying reason.
        reason: String,
    },

    /// A worker panicked or its process exited unsuccessfully.
    #[error("Worker {worker_id} failed: {reason}")]
    WorkerFailed {
        /// Id of the failed worker.
        worker_id: usize,
        /// Panic message or exit status.
        reason: String,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<FfmpegError> for ExtractError {
    fn from(error: FfmpegError) -> Self {
        ExtractError::FfmpegError(error.to_string())
    }
}
