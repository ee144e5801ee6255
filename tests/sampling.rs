//! Sampling step and candidate grid tests.

mod common;

use std::collections::BTreeSet;

use framesieve::{
    FrameRange, partition,
    sampling::{candidates_in, is_candidate, step},
};

use common::grid;

// ── Step ───────────────────────────────────────────────────────────

#[test]
fn step_is_floor_of_rate_ratio() {
    assert_eq!(step(30.0, 10), 3);
    assert_eq!(step(60.0, 1), 60);
    assert_eq!(step(29.97, 10), 2);
    assert_eq!(step(25.0, 2), 12);
}

#[test]
fn step_never_drops_below_one() {
    assert_eq!(step(24.0, 30), 1);
    assert_eq!(step(30.0, 30), 1);
    assert_eq!(step(0.5, 1), 1);
}

#[test]
fn step_with_invalid_rates_examines_every_frame() {
    assert_eq!(step(30.0, 0), 1);
    assert_eq!(step(0.0, 10), 1);
    assert_eq!(step(-25.0, 10), 1);
    assert_eq!(step(f64::NAN, 10), 1);
    assert_eq!(step(f64::INFINITY, 10), 1);
}

// ── Candidates ─────────────────────────────────────────────────────

#[test]
fn candidates_are_multiples_of_step() {
    assert!(is_candidate(0, 3));
    assert!(!is_candidate(1, 3));
    assert!(!is_candidate(2, 3));
    assert!(is_candidate(99, 3));
    assert!(is_candidate(7, 1));
}

#[test]
fn candidates_in_matches_enumeration() {
    for step_size in [1, 2, 3, 7, 30] {
        for (start, end) in [(0, 0), (0, 1), (0, 100), (1, 100), (13, 14), (25, 50), (99, 301)] {
            let range = FrameRange::new(start, end);
            let expected = (start..end).filter(|&i| is_candidate(i, step_size)).count() as u64;
            assert_eq!(
                candidates_in(range, step_size),
                expected,
                "range {range} step {step_size}"
            );
        }
    }
}

#[test]
fn sampling_grid_is_independent_of_partitioning() {
    let total = 1_003;
    let step_size = 7;
    let whole = grid(total, step_size);

    for workers in [1, 3, 4, 8, 16] {
        let mut union = BTreeSet::new();
        let mut counted = 0;
        for range in partition(total, workers) {
            union.extend((range.start..range.end).filter(|&i| is_candidate(i, step_size)));
            counted += candidates_in(range, step_size);
        }
        assert_eq!(union, whole, "workers={workers}");
        assert_eq!(counted, whole.len() as u64);
    }
}
