//! Progress board and aggregator tests.

mod common;

use std::{fs, sync::Arc, thread, time::Duration};

use framesieve::{
    ActiveWorkers, FrameRange, ProgressAggregator, ProgressBoard, ProgressEvent, PublishProgress,
    WorkerProgress, WorkerStatus, frame_file_name,
};
use tempfile::TempDir;

use common::RecordingProgress;

const FAST: Duration = Duration::from_millis(5);

fn aggregator(board: &ProgressBoard, active: &ActiveWorkers) -> ProgressAggregator {
    ProgressAggregator::new(board.clone(), active.clone())
        .with_bootstrap_interval(FAST)
        .with_poll_interval(FAST)
}

// ── Board ──────────────────────────────────────────────────────────

#[test]
fn board_starts_empty() {
    let (board, slots) = ProgressBoard::new(3);
    assert_eq!(board.len(), 3);
    assert_eq!(slots.len(), 3);
    assert_eq!(board.published_count(), 0);
    assert!(board.snapshot().iter().all(Option::is_none));
}

#[test]
fn each_slot_writes_only_its_own_worker() {
    let (board, mut slots) = ProgressBoard::new(2);
    assert_eq!(slots[1].worker_id(), 1);

    let progress = WorkerProgress::started(1, FrameRange::new(5, 10));
    slots[1].publish(&progress).unwrap();

    assert_eq!(board.get(0), None);
    assert_eq!(board.get(1), Some(progress));
    assert_eq!(board.get(2), None);
}

// ── Liveness ───────────────────────────────────────────────────────

#[test]
fn guards_track_live_workers() {
    let active = ActiveWorkers::new();
    let first = active.register();
    let second = active.register();
    assert_eq!(active.count(), 2);

    drop(first);
    assert!(active.any_alive());
    drop(second);
    assert!(!active.any_alive());
}

#[test]
fn guard_is_released_by_a_panicking_thread() {
    let active = ActiveWorkers::new();
    let guard = active.register();
    let result = thread::spawn(move || {
        let _guard = guard;
        panic!("worker crashed");
    })
    .join();

    assert!(result.is_err());
    assert_eq!(active.count(), 0);
}

// ── Statuses ───────────────────────────────────────────────────────

#[test]
fn status_display_formats() {
    assert_eq!(WorkerStatus::Starting.to_string(), "Starting...");
    let running = WorkerStatus::Running {
        percent: 42,
        done: 105,
        total: 250,
    };
    assert_eq!(running.to_string(), "42% | 105 / 250");
}

#[test]
fn unpublished_workers_are_starting() {
    let (board, _slots) = ProgressBoard::new(2);
    let statuses = aggregator(&board, &ActiveWorkers::new()).statuses();
    assert_eq!(statuses, vec![WorkerStatus::Starting; 2]);
}

#[test]
fn published_progress_is_a_truncated_percentage() {
    let (board, mut slots) = ProgressBoard::new(2);
    let mut progress = WorkerProgress::started(0, FrameRange::new(0, 3));
    progress.frames_examined = 2;
    slots[0].publish(&progress).unwrap();
    slots[1]
        .publish(&WorkerProgress::started(1, FrameRange::new(3, 3)))
        .unwrap();

    let statuses = aggregator(&board, &ActiveWorkers::new()).statuses();
    assert_eq!(
        statuses,
        vec![
            WorkerStatus::Running {
                percent: 66,
                done: 2,
                total: 3
            },
            WorkerStatus::Running {
                percent: 0,
                done: 0,
                total: 0
            },
        ]
    );
}

#[test]
fn percent_is_clamped() {
    let mut progress = WorkerProgress::started(0, FrameRange::new(0, 10));
    progress.frames_examined = 25;
    assert_eq!(progress.percent(), 100);
}

#[test]
fn unpublished_workers_fall_back_to_directory_count() {
    let dir = TempDir::new().unwrap();
    for index in [0, 3, 6, 27, 30] {
        fs::write(dir.path().join(frame_file_name(index)), b"x").unwrap();
    }
    let (board, _slots) = ProgressBoard::new(2);

    let statuses = aggregator(&board, &ActiveWorkers::new())
        .with_expected_ranges(vec![FrameRange::new(0, 25), FrameRange::new(25, 50)])
        .with_output_dir(dir.path())
        .statuses();

    assert_eq!(
        statuses,
        vec![
            WorkerStatus::Running {
                percent: 12,
                done: 3,
                total: 25
            },
            WorkerStatus::Running {
                percent: 8,
                done: 2,
                total: 25
            },
        ]
    );
}

#[test]
fn unreadable_directory_falls_back_to_starting() {
    let dir = TempDir::new().unwrap();
    let (board, _slots) = ProgressBoard::new(1);

    let statuses = aggregator(&board, &ActiveWorkers::new())
        .with_expected_ranges(vec![FrameRange::new(0, 10)])
        .with_output_dir(dir.path().join("missing"))
        .statuses();

    assert_eq!(statuses, vec![WorkerStatus::Starting]);
}

// ── Observation loop ───────────────────────────────────────────────

#[test]
fn bootstrap_returns_when_no_worker_is_alive() {
    let (board, _slots) = ProgressBoard::new(4);
    assert!(!aggregator(&board, &ActiveWorkers::new()).wait_for_ranges());
}

#[test]
fn bootstrap_returns_once_every_range_is_published() {
    let (board, slots) = ProgressBoard::new(2);
    let active = ActiveWorkers::new();
    let guard = active.register();

    let publisher = thread::spawn(move || {
        for (worker_id, mut slot) in slots.into_iter().enumerate() {
            thread::sleep(Duration::from_millis(10));
            slot.publish(&WorkerProgress::started(worker_id, FrameRange::new(0, 1)))
                .unwrap();
        }
    });

    assert!(aggregator(&board, &active).wait_for_ranges());
    publisher.join().unwrap();
    drop(guard);
}

#[test]
fn bootstrap_does_not_wait_for_workers_that_never_started() {
    let (board, mut slots) = ProgressBoard::new(2);
    let active = ActiveWorkers::new();
    let guard = active.register();
    slots[0]
        .publish(&WorkerProgress::started(0, FrameRange::new(0, 5)))
        .unwrap();

    assert!(
        aggregator(&board, &active)
            .with_skipped_workers(vec![1])
            .wait_for_ranges()
    );
    assert!(active.any_alive());
    drop(guard);
}

#[test]
fn run_stops_after_last_worker_ends() {
    let (board, mut slots) = ProgressBoard::new(1);
    let active = ActiveWorkers::new();
    let guard = active.register();
    let recorder = Arc::new(RecordingProgress::default());

    let observer = {
        let aggregator = aggregator(&board, &active);
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || aggregator.run(recorder.as_ref()))
    };

    let mut progress = WorkerProgress::started(0, FrameRange::new(0, 4));
    slots[0].publish(&progress).unwrap();
    thread::sleep(Duration::from_millis(30));
    progress.frames_examined = 4;
    progress.finished = true;
    slots[0].publish(&progress).unwrap();
    drop(guard);

    observer.join().unwrap();
    let last = recorder.events().into_iter().last();
    assert_eq!(
        last,
        Some(ProgressEvent::Worker {
            worker_id: 0,
            status: WorkerStatus::Running {
                percent: 100,
                done: 4,
                total: 4
            }
        })
    );
}
