//! Shared helpers for integration tests: an in-memory video and its opener.

#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use framesieve::{
    ExtractError, FrameSource, OpenSource, ProgressCallback, ProgressEvent, PublishProgress,
    WorkerProgress, parse_frame_file_name,
};
use image::{DynamicImage, Rgb, RgbImage};

pub const FRAME_SIZE: u32 = 16;

/// A deterministic in-memory video.
///
/// Every frame is a 16×16 checkerboard of 2-pixel squares whose phase moves
/// with the frame index, so each frame is sharp. Frames listed in `flat` are
/// a uniform grey and score 0.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    fps: f64,
    frame_count: u64,
    readable_frames: u64,
    panic_at: Option<u64>,
    flat: HashSet<u64>,
    position: u64,
    grabbed: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(frame_count: u64, fps: f64) -> Self {
        Self {
            fps,
            frame_count,
            readable_frames: frame_count,
            panic_at: None,
            flat: HashSet::new(),
            position: 0,
            grabbed: None,
        }
    }

    /// Report `frame_count` frames but run dry after `readable`.
    pub fn truncated(mut self, readable: u64) -> Self {
        self.readable_frames = readable.min(self.frame_count);
        self
    }

    /// Panic when grabbing frame `frame_index`.
    pub fn panicking_at(mut self, frame_index: u64) -> Self {
        self.panic_at = Some(frame_index);
        self
    }

    /// Render these frames flat.
    pub fn with_flat_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.flat.extend(frames);
        self
    }

    pub fn render(&self, frame_index: u64) -> DynamicImage {
        if self.flat.contains(&frame_index) {
            return DynamicImage::ImageRgb8(RgbImage::from_pixel(
                FRAME_SIZE,
                FRAME_SIZE,
                Rgb([128, 128, 128]),
            ));
        }
        let phase = (frame_index % 4) as u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(FRAME_SIZE, FRAME_SIZE, |x, y| {
            if ((x + phase) / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }
}

impl FrameSource for SyntheticVideo {
    fn frames_per_second(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, frame_number: u64) -> Result<(), ExtractError> {
        self.position = frame_number;
        self.grabbed = None;
        Ok(())
    }

    fn grab(&mut self) -> Result<bool, ExtractError> {
        if self.position >= self.readable_frames {
            self.grabbed = None;
            return Ok(false);
        }
        if self.panic_at == Some(self.position) {
            panic!("synthetic decoder failure at frame {}", self.position);
        }
        self.grabbed = Some(self.position);
        self.position += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<DynamicImage, ExtractError> {
        self.grabbed
            .map(|index| self.render(index))
            .ok_or(ExtractError::NothingGrabbed)
    }
}

/// Opens a fresh copy of a [`SyntheticVideo`] for any path.
#[derive(Debug, Clone)]
pub struct SyntheticOpener {
    template: SyntheticVideo,
}

impl SyntheticOpener {
    pub fn new(template: SyntheticVideo) -> Self {
        Self { template }
    }

    pub fn shared(template: SyntheticVideo) -> Arc<dyn OpenSource> {
        Arc::new(Self::new(template))
    }
}

impl OpenSource for SyntheticOpener {
    fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, ExtractError> {
        Ok(Box::new(self.template.clone()))
    }
}

/// Records every publication.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: Vec<WorkerProgress>,
}

impl PublishProgress for RecordingPublisher {
    fn publish(&mut self, progress: &WorkerProgress) -> Result<(), ExtractError> {
        self.published.push(progress.clone());
        Ok(())
    }
}

/// Records every progress event.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A stand-in video file: configuration validation only checks that the
/// path is a readable file.
pub fn placeholder_video(dir: &Path) -> PathBuf {
    let path = dir.join("video.mp4");
    fs::write(&path, b"not really a video").unwrap();
    path
}

/// Indices of the frame files in `dir`.
pub fn frame_indices(dir: &Path) -> BTreeSet<u64> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| {
            let name = entry.unwrap().file_name();
            name.to_str().and_then(parse_frame_file_name)
        })
        .collect()
}

/// Every multiple of `step` below `end`.
pub fn grid(end: u64, step: u64) -> BTreeSet<u64> {
    (0..end).step_by(step as usize).collect()
}
