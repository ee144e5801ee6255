//! Frame-range partitioning.
//!
//! [`partition`] splits `[0, total_frames)` into one contiguous range per
//! worker. Every worker gets `total_frames / worker_count` frames except the
//! last, which also takes the remainder.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A half-open range of absolute frame indices, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameRange {
    /// First frame index in the range.
    pub start: u64,
    /// One past the last frame index in the range.
    pub end: u64,
}

impl FrameRange {
    /// Create a range. `end` is clamped so that it is never below `start`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of frames in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// `true` when `start == end`.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `frame_index` falls inside the range.
    pub fn contains(&self, frame_index: u64) -> bool {
        self.start <= frame_index && frame_index < self.end
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Split `[0, total_frames)` into `worker_count` ordered, disjoint ranges.
///
/// When there are fewer frames than workers the chunk size would be zero, so
/// instead each of the first `total_frames` workers gets a single frame and
/// the rest get empty ranges at `total_frames`. Returns an empty vector when
/// `worker_count == 0`.
///
/// # Example
///
/// ```
/// use framesieve::{FrameRange, partition};
///
/// let ranges = partition(10, 3);
/// assert_eq!(
///     ranges,
///     vec![FrameRange::new(0, 3), FrameRange::new(3, 6), FrameRange::new(6, 10)],
/// );
///
/// let sparse = partition(2, 4);
/// assert_eq!(sparse[1], FrameRange::new(1, 2));
/// assert!(sparse[3].is_empty());
/// ```
pub fn partition(total_frames: u64, worker_count: usize) -> Vec<FrameRange> {
    if worker_count == 0 {
        return Vec::new();
    }

    let workers = worker_count as u64;
    if total_frames < workers {
        return (0..workers)
            .map(|i| {
                let start = i.min(total_frames);
                FrameRange::new(start, (i + 1).min(total_frames))
            })
            .collect();
    }

    let chunk_size = total_frames / workers;
    (0..workers)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == workers - 1 {
                total_frames
            } else {
                (i + 1) * chunk_size
            };
            FrameRange::new(start, end)
        })
        .collect()
}
