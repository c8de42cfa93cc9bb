//! Default jitter buffer (variant b, §9): a bounded FIFO keyed by arrival
//! order, with a prime gate and a low-water pre-wait. No per-sequence
//! reordering is performed — arrival order is playout order. See
//! `ordered_buffer` for the opt-in sequence-ordered variant (c).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::protocol::AudioFrame;

struct Inner {
    queue: VecDeque<AudioFrame>,
    target_frames: usize,
    max_frames: usize,
    primed: bool,
}

/// Counters are lock-free atomics so `StatsSampler` can sample them without
/// taking the buffer's lock (per §5, "Counters are lock-free atomics").
#[derive(Default)]
struct Counters {
    pushed: AtomicUsize,
    played: AtomicUsize,
    missing: AtomicUsize,
    late: AtomicUsize,
    overflow_dropped: AtomicUsize,
}

/// Point-in-time view of the buffer's counters and occupancy.
#[derive(Debug, Clone, Copy, Default)]
pub struct JitterBufferSnapshot {
    pub pushed: usize,
    pub played: usize,
    pub missing: usize,
    pub late: usize,
    pub overflow_dropped: usize,
    pub buffered: usize,
    pub target_frames: usize,
    pub max_frames: usize,
    pub primed: bool,
}

/// Bounded, mutex/condvar-guarded FIFO of `AudioFrame`s awaiting playout.
pub struct JitterBuffer {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    counters: Counters,
}

impl JitterBuffer {
    /// `target_frames` and `max_frames` must satisfy
    /// `2 <= target_frames <= max_frames - 1` (§3 invariant); out-of-range
    /// inputs are clamped.
    pub fn new(target_frames: usize, max_frames: usize) -> Self {
        let max_frames = max_frames.max(3);
        let target_frames = target_frames.clamp(2, max_frames - 1);
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(max_frames),
                target_frames,
                max_frames,
                primed: false,
            }),
            not_empty: Condvar::new(),
            counters: Counters::default(),
        }
    }

    /// Enqueue a frame. Drops the oldest frame on overflow rather than
    /// blocking the network thread.
    pub fn push(&self, frame: AudioFrame) {
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        if inner.queue.len() == inner.max_frames {
            inner.queue.pop_front();
            self.counters.overflow_dropped.fetch_add(1, Ordering::Relaxed);
        }
        inner.queue.push_back(frame);

        if !inner.primed && inner.queue.len() >= inner.target_frames {
            inner.primed = true;
        }
        self.not_empty.notify_all();
    }

    /// Pop the next frame for playout, waiting up to `timeout` total.
    ///
    /// Returns `None` if the buffer is not primed by the deadline, or if it
    /// is primed but empties out before the deadline (an underrun from the
    /// player's point of view).
    pub fn pop(&self, timeout: Duration) -> Option<AudioFrame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        if !inner.primed {
            while !inner.primed {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let remaining = deadline - now;
                let result = self.not_empty.wait_for(&mut inner, remaining);
                if result.timed_out() && !inner.primed {
                    return None;
                }
            }
        }

        // Low-water pre-wait: once primed, prefer to let the buffer refill a
        // little before draining it, to smooth bursty arrival.
        let low_water = inner.target_frames.max(1) / 2;
        let low_water = low_water.max(1);
        while inner.queue.len() <= low_water {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let result = self.not_empty.wait_for(&mut inner, remaining);
            if result.timed_out() {
                break;
            }
        }

        while inner.queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                self.counters.missing.fetch_add(1, Ordering::Relaxed);
                self.counters.played.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            let remaining = deadline - now;
            let _ = self.not_empty.wait_for(&mut inner, remaining);
        }

        let frame = inner.queue.pop_front();
        match frame {
            Some(frame) => {
                self.counters.played.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            None => {
                self.counters.missing.fetch_add(1, Ordering::Relaxed);
                self.counters.played.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Clamp and apply a new target occupancy (driven by `AdaptiveController`).
    pub fn set_target_frames(&self, target_frames: usize) {
        let mut inner = self.inner.lock();
        let clamped = target_frames.clamp(2, inner.max_frames - 1);
        inner.target_frames = clamped;
        if !inner.primed && inner.queue.len() >= clamped {
            inner.primed = true;
        }
        self.not_empty.notify_all();
    }

    pub fn target_frames(&self) -> usize {
        self.inner.lock().target_frames
    }

    pub fn max_frames(&self) -> usize {
        self.inner.lock().max_frames
    }

    pub fn is_primed(&self) -> bool {
        self.inner.lock().primed
    }

    pub fn buffered(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Drop all buffered frames and unprime. Used only at session start/stop,
    /// never mid-session (once primed, a session never unprimes — §3).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.primed = false;
        self.counters.pushed.store(0, Ordering::Relaxed);
        self.counters.played.store(0, Ordering::Relaxed);
        self.counters.missing.store(0, Ordering::Relaxed);
        self.counters.late.store(0, Ordering::Relaxed);
        self.counters.overflow_dropped.store(0, Ordering::Relaxed);
    }

    /// Wake any thread blocked in `pop`, e.g. on session teardown.
    pub fn wake_waiters(&self) {
        self.not_empty.notify_all();
    }

    pub fn snapshot(&self) -> JitterBufferSnapshot {
        let inner = self.inner.lock();
        JitterBufferSnapshot {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            played: self.counters.played.load(Ordering::Relaxed),
            missing: self.counters.missing.load(Ordering::Relaxed),
            late: self.counters.late.load(Ordering::Relaxed),
            overflow_dropped: self.counters.overflow_dropped.load(Ordering::Relaxed),
            buffered: inner.queue.len(),
            target_frames: inner.target_frames,
            max_frames: inner.max_frames,
            primed: inner.primed,
        }
    }
}
