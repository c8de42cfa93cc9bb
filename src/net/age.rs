//! Network age/path/jitter accounting (§4.6).
//!
//! Given each frame's `send_time_us` and the receiver's own clock, tracks a
//! running minimum one-way-delay baseline so that `path` (the delay above
//! the best-observed path) and an inter-arrival jitter accumulator can be
//! reported per stats window, independent of clock offset between sender
//! and receiver.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::MAX_PLAUSIBLE_AGE_US;

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Running estimator of one-way network delay, updated per accepted frame.
///
/// Per §4.6, `age` and `path` are each kept as a running sum+count so
/// `StatsSampler` can read-and-reset them every window to obtain per-window
/// averages, rather than a single instantaneous last-sample value.
pub struct NetworkAgeTracker {
    min_age_us: AtomicI64,
    last_age_us: AtomicI64,
    age_sum_us: AtomicI64,
    age_count: AtomicU64,
    path_sum_us: AtomicI64,
    path_count: AtomicU64,
    jitter_accum_us: AtomicI64,
    jitter_samples: AtomicU64,
    samples: AtomicU64,
}

impl NetworkAgeTracker {
    pub fn new() -> Self {
        Self {
            min_age_us: AtomicI64::new(i64::MAX),
            last_age_us: AtomicI64::new(0),
            age_sum_us: AtomicI64::new(0),
            age_count: AtomicU64::new(0),
            path_sum_us: AtomicI64::new(0),
            path_count: AtomicU64::new(0),
            jitter_accum_us: AtomicI64::new(0),
            jitter_samples: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Record a frame's `send_time_us`. Returns `None` if the computed age
    /// is implausible (negative, or beyond `MAX_PLAUSIBLE_AGE_US`) — such
    /// samples are excluded from the running baseline entirely.
    pub fn record(&self, send_time_us: u64) -> Option<i64> {
        let age_us = now_us() as i64 - send_time_us as i64;
        if age_us < 0 || age_us > MAX_PLAUSIBLE_AGE_US {
            return None;
        }

        self.min_age_us.fetch_min(age_us, Ordering::Relaxed);
        let min_age = self.min_age_us.load(Ordering::Relaxed);
        let path_us = age_us - min_age;

        self.age_sum_us.fetch_add(age_us, Ordering::Relaxed);
        self.age_count.fetch_add(1, Ordering::Relaxed);
        self.path_sum_us.fetch_add(path_us, Ordering::Relaxed);
        self.path_count.fetch_add(1, Ordering::Relaxed);

        let prev = self.last_age_us.swap(age_us, Ordering::Relaxed);
        if self.samples.fetch_add(1, Ordering::Relaxed) > 0 {
            let delta = (age_us - prev).abs();
            self.jitter_accum_us.fetch_add(delta, Ordering::Relaxed);
            self.jitter_samples.fetch_add(1, Ordering::Relaxed);
        }

        Some(age_us)
    }

    /// Most recently recorded age, in microseconds.
    pub fn last_age_us(&self) -> i64 {
        self.last_age_us.load(Ordering::Relaxed)
    }

    /// `path` = most recent age minus the running minimum age ever observed.
    pub fn path_us(&self) -> i64 {
        let min_age = self.min_age_us.load(Ordering::Relaxed);
        if min_age == i64::MAX {
            return 0;
        }
        self.last_age_us.load(Ordering::Relaxed) - min_age
    }

    /// Average age over the samples recorded since the last call, in
    /// microseconds. Reads and resets the running sum+count (§4.6).
    pub fn take_avg_age_us(&self) -> i64 {
        let count = self.age_count.swap(0, Ordering::Relaxed);
        let sum = self.age_sum_us.swap(0, Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            sum / count as i64
        }
    }

    /// Average path (age above the running minimum) over the samples
    /// recorded since the last call, in microseconds. Reads and resets the
    /// running sum+count (§4.6).
    pub fn take_avg_path_us(&self) -> i64 {
        let count = self.path_count.swap(0, Ordering::Relaxed);
        let sum = self.path_sum_us.swap(0, Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            sum / count as i64
        }
    }

    /// Average absolute inter-arrival jitter, in microseconds, over the
    /// samples recorded since the last call. Reads and resets the running
    /// accumulator+count (§6: "avg net inter-arrival jitter").
    pub fn take_jitter_accum_us(&self) -> i64 {
        let count = self.jitter_samples.swap(0, Ordering::Relaxed);
        let sum = self.jitter_accum_us.swap(0, Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            sum / count as i64
        }
    }
}

impl Default for NetworkAgeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_age_is_rejected_and_excluded_from_baseline() {
        let tracker = NetworkAgeTracker::new();
        let future_send_time = now_us() + 10_000_000;
        assert_eq!(tracker.record(future_send_time), None);
        assert_eq!(tracker.path_us(), 0);
    }

    #[test]
    fn path_tracks_deviation_above_running_minimum() {
        let tracker = NetworkAgeTracker::new();
        let base = now_us();

        tracker.record(base - 10_000);
        let first_path = tracker.path_us();
        assert_eq!(first_path, 0);

        tracker.record(base - 5_000);
        assert!(tracker.path_us() > first_path);
    }

    #[test]
    fn implausibly_old_timestamp_is_rejected() {
        let tracker = NetworkAgeTracker::new();
        let ancient = now_us().saturating_sub((MAX_PLAUSIBLE_AGE_US as u64) + 1_000_000);
        assert_eq!(tracker.record(ancient), None);
    }

    #[test]
    fn take_avg_age_and_path_average_and_reset() {
        let tracker = NetworkAgeTracker::new();
        let base = now_us();

        tracker.record(base - 10_000);
        tracker.record(base - 20_000);

        let avg_age = tracker.take_avg_age_us();
        assert!(avg_age > 0);
        // Reading resets the running sum+count.
        assert_eq!(tracker.take_avg_age_us(), 0);
        assert_eq!(tracker.take_avg_path_us(), 0);
    }

    #[test]
    fn take_jitter_accum_averages_over_samples_since_last_read() {
        let tracker = NetworkAgeTracker::new();
        let base = now_us();

        tracker.record(base - 10_000);
        tracker.record(base - 20_000);
        tracker.record(base - 12_000);

        let avg_jitter = tracker.take_jitter_accum_us();
        assert!(avg_jitter > 0);
        assert_eq!(tracker.take_jitter_accum_us(), 0);
    }
}
