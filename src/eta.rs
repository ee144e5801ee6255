//! Remaining-time estimation for single-worker runs.
//!
//! [`EtaEstimator`] keeps the durations of the last few candidate cycles (the
//! time from one candidate frame to the next, including the skipped frames in
//! between) and multiplies their mean by the number of candidates still to
//! come.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Number of recent candidate cycles averaged by [`EtaEstimator`].
pub const ETA_WINDOW: usize = 10;

/// Format a number of seconds as `Dd HH:MM:SS`, `HH:MM:SS`, or `MM:SS`.
///
/// Days are shown only when non-zero, hours only when days or hours are.
///
/// ```
/// use framesieve::format_eta;
///
/// assert_eq!(format_eta(0), "00:00");
/// assert_eq!(format_eta(65), "01:05");
/// assert_eq!(format_eta(3661), "01:01:01");
/// assert_eq!(format_eta(90_000), "1d 01:00:00");
/// ```
pub fn format_eta(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}:{secs:02}")
    } else if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Moving-average ETA over the last [`ETA_WINDOW`] candidate cycles.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    cycles: VecDeque<Duration>,
    last_candidate: Option<Instant>,
}

impl EtaEstimator {
    /// An estimator with no history.
    pub fn new() -> Self {
        Self {
            cycles: VecDeque::with_capacity(ETA_WINDOW),
            last_candidate: None,
        }
    }

    /// Note that a candidate frame finished at `now`. From the second call
    /// on, the time since the previous call is recorded as one cycle.
    pub fn mark_candidate(&mut self, now: Instant) {
        if let Some(previous) = self.last_candidate.replace(now) {
            self.record_cycle(now.saturating_duration_since(previous));
        }
    }

    /// Record one cycle duration directly, evicting the oldest past the
    /// window.
    pub fn record_cycle(&mut self, cycle: Duration) {
        if self.cycles.len() == ETA_WINDOW {
            self.cycles.pop_front();
        }
        self.cycles.push_back(cycle);
    }

    /// Number of cycles currently averaged.
    pub fn samples(&self) -> usize {
        self.cycles.len()
    }

    /// Mean cycle duration, or `None` before the first cycle.
    pub fn mean_cycle(&self) -> Option<Duration> {
        if self.cycles.is_empty() {
            return None;
        }
        let total: Duration = self.cycles.iter().sum();
        Some(total / self.cycles.len() as u32)
    }

    /// Estimated time to process `remaining_candidates` more candidates.
    pub fn estimate(&self, remaining_candidates: u64) -> Option<Duration> {
        self.mean_cycle().map(|mean| {
            let nanos = mean.as_nanos() * u128::from(remaining_candidates);
            Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
        })
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new()
    }
}
