//! FFmpeg-backed source tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`.

use std::path::Path;

use framesieve::{
    ExtractError, ExtractionConfig, FfmpegOpener, FrameSource, OpenSource, RunCoordinator,
    VideoFile,
};
use tempfile::TempDir;

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn frame_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| framesieve::parse_frame_file_name(name).is_some())
        .collect();
    names.sort();
    names
}

// ── Opening ────────────────────────────────────────────────────────

#[test]
fn open_reports_stream_properties() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let video = VideoFile::open(path).expect("Failed to open fixture");
    assert!((video.frames_per_second() - 30.0).abs() < 0.01);
    assert!(
        (148..=152).contains(&video.frame_count()),
        "Unexpected frame count {}",
        video.frame_count()
    );
    assert_eq!((video.width(), video.height()), (640, 480));
    assert_eq!(video.path(), Path::new(path));
}

#[test]
fn open_missing_file_fails() {
    let result = VideoFile::open("tests/fixtures/does_not_exist.mp4");
    assert!(matches!(result, Err(ExtractError::FileOpen { .. })));
}

#[test]
fn opener_returns_independent_handles() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut first = FfmpegOpener.open(Path::new(path)).unwrap();
    let mut second = FfmpegOpener.open(Path::new(path)).unwrap();
    first.seek(60).unwrap();
    assert!(first.grab().unwrap());
    assert!(second.grab().unwrap());
    assert_eq!(second.frame_count(), first.frame_count());
}

// ── Reading ────────────────────────────────────────────────────────

#[test]
fn retrieve_before_grab_fails() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut video = VideoFile::open(path).unwrap();
    assert!(matches!(video.retrieve(), Err(ExtractError::NothingGrabbed)));
}

#[test]
fn grab_and_retrieve_first_frame() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut video = VideoFile::open(path).unwrap();
    video.seek(0).unwrap();
    assert!(video.grab().unwrap());
    let image = video.retrieve().unwrap();
    assert_eq!((image.width(), image.height()), (640, 480));
}

#[test]
fn seek_then_read_to_exhaustion() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut video = VideoFile::open(path).unwrap();
    let total = video.frame_count();
    video.seek(90).unwrap();

    let mut grabbed = 0;
    while video.grab().unwrap() {
        grabbed += 1;
    }
    let expected = total - 90;
    assert!(
        grabbed + 2 >= expected && grabbed <= expected + 2,
        "Read {grabbed} frames after seeking to 90 of {total}"
    );
    assert!(!video.grab().unwrap());
}

// ── End to end ─────────────────────────────────────────────────────

#[test]
fn single_and_multi_worker_runs_agree_on_a_real_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let single = TempDir::new().unwrap();
    let single_result = RunCoordinator::new(
        ExtractionConfig::new(path, single.path().join("frames"))
            .with_target_fps(5)
            .with_blur_threshold(0.0)
            .with_session_file(single.path().join("session.json")),
    )
    .run()
    .unwrap();

    let multi = TempDir::new().unwrap();
    let multi_result = RunCoordinator::new(
        ExtractionConfig::new(path, multi.path().join("frames"))
            .with_target_fps(5)
            .with_blur_threshold(0.0)
            .with_multicore(true)
            .with_worker_count(4)
            .with_session_file(multi.path().join("session.json")),
    )
    .run()
    .unwrap();

    assert!(single_result.total_saved >= 24);
    assert_eq!(single_result.total_saved, multi_result.total_saved);
    assert_eq!(
        frame_files(&single.path().join("frames")),
        frame_files(&multi.path().join("frames"))
    );
    assert!(multi_result.all_completed());
}
