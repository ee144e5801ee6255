//! Frame worker tests over an in-memory video.

mod common;

use std::fs;

use framesieve::{
    CancellationToken, ExtractError, FrameRange, FrameWorker, WorkerJob, frame_file_name,
    parse_frame_file_name,
    worker::{count_frame_files, save_frame},
};
use tempfile::TempDir;

use common::{RecordingPublisher, SyntheticVideo, frame_indices, grid};

fn job(dir: &TempDir, range: FrameRange) -> WorkerJob {
    WorkerJob::new(0, "synthetic.mp4", dir.path(), range)
        .with_target_fps(10)
        .with_blur_threshold(0.0)
}

// ── Extraction ─────────────────────────────────────────────────────

#[test]
fn worker_saves_every_sharp_candidate() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(100, 30.0);
    let mut publisher = RecordingPublisher::default();

    let progress = FrameWorker::new(job(&dir, FrameRange::new(0, 100)))
        .run(&mut video, &mut publisher)
        .unwrap();

    assert_eq!(progress.frames_examined, 100);
    assert_eq!(progress.candidates_scored, 34);
    assert_eq!(progress.frames_saved, 34);
    assert!(progress.finished);
    assert_eq!(frame_indices(dir.path()), grid(100, 3));
}

#[test]
fn worker_uses_absolute_frame_indices() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(100, 30.0);

    FrameWorker::new(job(&dir, FrameRange::new(25, 50)))
        .run(&mut video, &mut RecordingPublisher::default())
        .unwrap();

    let expected: Vec<u64> = (25..50).filter(|i| i % 3 == 0).collect();
    assert_eq!(frame_indices(dir.path()).into_iter().collect::<Vec<_>>(), expected);
    assert!(dir.path().join("frame_000027.jpg").exists());
}

#[test]
fn worker_rejects_blurry_frames() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(30, 30.0).with_flat_frames([0, 3, 6]);

    let progress = FrameWorker::new(job(&dir, FrameRange::new(0, 30)).with_blur_threshold(1.0))
        .run(&mut video, &mut RecordingPublisher::default())
        .unwrap();

    assert_eq!(progress.candidates_scored, 10);
    assert_eq!(progress.frames_saved, 7);
    assert!(!dir.path().join(frame_file_name(3)).exists());
    assert!(dir.path().join(frame_file_name(9)).exists());
}

#[test]
fn existing_files_count_as_saved_and_are_kept() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join(frame_file_name(6));
    fs::write(&existing, b"already here").unwrap();
    let mut video = SyntheticVideo::new(10, 30.0);

    let progress = FrameWorker::new(job(&dir, FrameRange::new(0, 10)))
        .run(&mut video, &mut RecordingPublisher::default())
        .unwrap();

    assert_eq!(progress.frames_saved, 4);
    assert_eq!(fs::read(&existing).unwrap(), b"already here");
}

#[test]
fn written_frames_are_decodable_jpegs() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(1, 30.0);

    FrameWorker::new(job(&dir, FrameRange::new(0, 1)))
        .run(&mut video, &mut RecordingPublisher::default())
        .unwrap();

    let image = image::open(dir.path().join(frame_file_name(0))).unwrap();
    assert_eq!((image.width(), image.height()), (16, 16));
    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter(|entry| {
            let name = entry.as_ref().unwrap().file_name();
            name.to_string_lossy().ends_with(".part")
        })
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn save_frame_writes_once_and_leaves_no_partial_file() {
    let dir = TempDir::new().unwrap();
    let frame = SyntheticVideo::new(1, 30.0).render(0);

    assert!(save_frame(&frame, dir.path(), 7).unwrap());
    assert!(!save_frame(&frame, dir.path(), 7).unwrap());

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![frame_file_name(7)]);
    let image = image::open(dir.path().join(frame_file_name(7))).unwrap();
    assert_eq!((image.width(), image.height()), (16, 16));
}

// ── Progress ───────────────────────────────────────────────────────

#[test]
fn worker_publishes_at_start_every_ten_frames_and_at_end() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(100, 30.0);
    let mut publisher = RecordingPublisher::default();

    FrameWorker::new(job(&dir, FrameRange::new(0, 35)))
        .run(&mut video, &mut publisher)
        .unwrap();

    let examined: Vec<u64> = publisher
        .published
        .iter()
        .map(|progress| progress.frames_examined)
        .collect();
    assert_eq!(examined, vec![0, 10, 20, 30, 35]);

    let first = &publisher.published[0];
    assert_eq!(first.range, FrameRange::new(0, 35));
    assert!(!first.finished);
    assert!(publisher.published.last().unwrap().finished);
    assert_eq!(
        publisher.published.iter().filter(|progress| progress.finished).count(),
        1
    );
}

#[test]
fn publish_interval_is_configurable() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(5, 30.0);
    let mut publisher = RecordingPublisher::default();

    FrameWorker::new(job(&dir, FrameRange::new(0, 5)))
        .with_publish_interval(1)
        .run(&mut video, &mut publisher)
        .unwrap();

    assert_eq!(publisher.published.len(), 7);
}

#[test]
fn exhausted_source_finishes_early() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(100, 30.0).truncated(50);
    let mut publisher = RecordingPublisher::default();

    let progress = FrameWorker::new(job(&dir, FrameRange::new(0, 100)))
        .run(&mut video, &mut publisher)
        .unwrap();

    assert_eq!(progress.frames_examined, 50);
    assert_eq!(progress.frames_saved, 17);
    assert!(progress.finished);
    assert_eq!(progress.percent(), 50);
}

#[test]
fn empty_range_finishes_immediately() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(2, 30.0);
    let mut publisher = RecordingPublisher::default();

    let progress = FrameWorker::new(job(&dir, FrameRange::new(2, 2)))
        .run(&mut video, &mut publisher)
        .unwrap();

    assert_eq!(progress.frames_examined, 0);
    assert_eq!(progress.frames_saved, 0);
    assert_eq!(progress.percent(), 0);
    assert!(progress.finished);
    assert_eq!(publisher.published.len(), 2);
    assert!(frame_indices(dir.path()).is_empty());
}

#[test]
fn cancelled_worker_finalizes_and_errors() {
    let dir = TempDir::new().unwrap();
    let mut video = SyntheticVideo::new(100, 30.0);
    let mut publisher = RecordingPublisher::default();
    let token = CancellationToken::new();
    token.cancel();

    let result = FrameWorker::new(job(&dir, FrameRange::new(0, 100)))
        .with_cancellation(token)
        .run(&mut video, &mut publisher);

    assert!(matches!(result, Err(ExtractError::Cancelled)));
    let last = publisher.published.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.frames_examined, 0);
}

// ── File names ─────────────────────────────────────────────────────

#[test]
fn frame_file_names_are_zero_padded() {
    assert_eq!(frame_file_name(0), "frame_000000.jpg");
    assert_eq!(frame_file_name(123), "frame_000123.jpg");
    assert_eq!(frame_file_name(1_234_567), "frame_1234567.jpg");
}

#[test]
fn frame_file_names_parse_back() {
    for index in [0, 7, 999_999, 1_000_000] {
        assert_eq!(parse_frame_file_name(&frame_file_name(index)), Some(index));
    }
    assert_eq!(parse_frame_file_name("frame_12.jpg"), None);
    assert_eq!(parse_frame_file_name("frame_00001a.jpg"), None);
    assert_eq!(parse_frame_file_name("frame_000001.png"), None);
    assert_eq!(parse_frame_file_name("still_000001.jpg"), None);
}

#[test]
fn count_frame_files_filters_by_range() {
    let dir = TempDir::new().unwrap();
    for index in [1, 5, 10, 15] {
        fs::write(dir.path().join(frame_file_name(index)), b"x").unwrap();
    }
    fs::write(dir.path().join("notes.jpg"), b"x").unwrap();

    assert_eq!(count_frame_files(dir.path(), None).unwrap(), 4);
    assert_eq!(
        count_frame_files(dir.path(), Some(FrameRange::new(5, 15))).unwrap(),
        2
    );
}
