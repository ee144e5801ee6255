//! Frame sampling.
//!
//! The sampling step turns a native frame rate and a desired output rate
//! into "every Nth frame". Candidates are anchored to absolute frame index
//! 0, so every worker samples the same grid no matter where its range
//! starts.

use crate::partition::FrameRange;

/// `max(floor(native_fps / target_fps), 1)`.
///
/// A zero target or a non-finite/non-positive native rate yields `1`
/// (examine every frame).
pub fn step(native_fps: f64, target_fps: u32) -> u64 {
    if target_fps == 0 || !native_fps.is_finite() || native_fps <= 0.0 {
        return 1;
    }
    ((native_fps / target_fps as f64).floor() as u64).max(1)
}

/// Whether the frame at absolute index `frame_index` is evaluated.
pub fn is_candidate(frame_index: u64, step: u64) -> bool {
    frame_index % step.max(1) == 0
}

/// Number of candidate frames inside `range`.
pub fn candidates_in(range: FrameRange, step: u64) -> u64 {
    let step = step.max(1);
    if range.is_empty() {
        return 0;
    }
    // Multiples of `step` in [0, end) minus those in [0, start).
    range.end.div_ceil(step) - range.start.div_ceil(step)
}
