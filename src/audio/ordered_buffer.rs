//! Opt-in sequence-ordered jitter buffer (variant c, §9).
//!
//! Unlike the default FIFO (`jitter_buffer::JitterBuffer`), this variant
//! keys frames by wire sequence number, detects gaps, trims overflow by
//! *recent window* instead of drop-oldest, and synthesizes a fade-to-zero
//! concealment frame (0.92× the previous sample, per §9) when a gap is
//! played through. It is meant for lossy UDP paths that also reorder; do not
//! mix it with the default buffer in the same session.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::protocol::AudioFrame;

const CONCEALMENT_DECAY: f32 = 0.92;

struct Inner {
    /// Frames keyed by sequence number, so out-of-order arrivals settle into
    /// the right playout slot.
    slots: BTreeMap<u32, AudioFrame>,
    next_seq: Option<u32>,
    target_frames: usize,
    max_frames: usize,
    primed: bool,
    last_frame_shape: Option<(u32, u8, u16)>, // (sample_rate, channels, samples_per_channel)
    last_played_samples: Vec<i16>,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicUsize,
    played: AtomicUsize,
    missing: AtomicUsize,
    late: AtomicUsize,
    overflow_dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedBufferSnapshot {
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

pub struct OrderedJitterBuffer {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    counters: Counters,
}

impl OrderedJitterBuffer {
    pub fn new(target_frames: usize, max_frames: usize) -> Self {
        let max_frames = max_frames.max(3);
        let target_frames = target_frames.clamp(2, max_frames - 1);
        Self {
            inner: Mutex::new(Inner {
                slots: BTreeMap::new(),
                next_seq: None,
                target_frames,
                max_frames,
                primed: false,
                last_frame_shape: None,
                last_played_samples: Vec::new(),
            }),
            not_empty: Condvar::new(),
            counters: Counters::default(),
        }
    }

    /// Insert a frame keyed by its wire sequence number. Frames that arrive
    /// behind the already-advanced playout point are counted `late` and
    /// dropped. Overflow is trimmed by *recent window*: once the slot map
    /// exceeds `max_frames`, the earliest sequence numbers are evicted
    /// first, keeping the most recently numbered frames.
    pub fn push(&self, frame: AudioFrame) {
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();

        if inner.next_seq.is_none() {
            inner.next_seq = Some(frame.seq);
        }
        let next_seq = inner.next_seq.unwrap();

        if seq_before(frame.seq, next_seq) {
            self.counters.late.fetch_add(1, Ordering::Relaxed);
            return;
        }

        inner.slots.insert(frame.seq, frame);

        while inner.slots.len() > inner.max_frames {
            if let Some((&oldest, _)) = inner.slots.iter().next() {
                inner.slots.remove(&oldest);
                self.counters.overflow_dropped.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }

        if !inner.primed && inner.slots.len() >= inner.target_frames {
            inner.primed = true;
        }
        self.not_empty.notify_all();
    }

    /// Pop the frame for the next expected sequence number, synthesizing a
    /// fade-to-zero concealment frame if it is missing once the deadline
    /// elapses.
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

        let low_water = inner.target_frames.max(1) / 2;
        let low_water = low_water.max(1);
        while inner.slots.len() <= low_water {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            if self.not_empty.wait_for(&mut inner, remaining).timed_out() {
                break;
            }
        }

        let next_seq = inner.next_seq.unwrap_or(0);

        loop {
            if let Some(frame) = inner.slots.remove(&next_seq) {
                inner.next_seq = Some(next_seq.wrapping_add(1));
                inner.last_frame_shape =
                    Some((frame.sample_rate, frame.channels, frame.samples_per_channel));
                inner.last_played_samples = frame.payload.clone();
                self.counters.played.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }

            if Instant::now() >= deadline {
                self.counters.missing.fetch_add(1, Ordering::Relaxed);
                self.counters.played.fetch_add(1, Ordering::Relaxed);
                inner.next_seq = Some(next_seq.wrapping_add(1));
                return self.concealment_frame(&mut inner, next_seq);
            }

            if inner.slots.is_empty() {
                let remaining = deadline - Instant::now();
                let _ = self.not_empty.wait_for(&mut inner, remaining);
                continue;
            }

            // Something is buffered but not at `next_seq` yet: give it a
            // short grace window rather than spinning.
            let remaining = deadline - Instant::now();
            let _ = self.not_empty.wait_for(&mut inner, remaining.min(Duration::from_millis(2)));
        }
    }

    fn concealment_frame(&self, inner: &mut Inner, seq: u32) -> Option<AudioFrame> {
        let (sample_rate, channels, samples_per_channel) = inner.last_frame_shape?;
        let faded: Vec<i16> = inner
            .last_played_samples
            .iter()
            .map(|&s| (s as f32 * CONCEALMENT_DECAY) as i16)
            .collect();
        inner.last_played_samples = faded.clone();
        Some(AudioFrame {
            sample_rate,
            channels,
            seq,
            send_time_us: 0,
            samples_per_channel,
            payload: faded,
        })
    }

    pub fn set_target_frames(&self, target_frames: usize) {
        let mut inner = self.inner.lock();
        let clamped = target_frames.clamp(2, inner.max_frames - 1);
        inner.target_frames = clamped;
        if !inner.primed && inner.slots.len() >= clamped {
            inner.primed = true;
        }
        self.not_empty.notify_all();
    }

    pub fn target_frames(&self) -> usize {
        self.inner.lock().target_frames
    }

    pub fn is_primed(&self) -> bool {
        self.inner.lock().primed
    }

    pub fn buffered(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn wake_waiters(&self) {
        self.not_empty.notify_all();
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.next_seq = None;
        inner.primed = false;
        inner.last_frame_shape = None;
        inner.last_played_samples.clear();
        self.counters.pushed.store(0, Ordering::Relaxed);
        self.counters.played.store(0, Ordering::Relaxed);
        self.counters.missing.store(0, Ordering::Relaxed);
        self.counters.late.store(0, Ordering::Relaxed);
        self.counters.overflow_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OrderedBufferSnapshot {
        let inner = self.inner.lock();
        OrderedBufferSnapshot {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            played: self.counters.played.load(Ordering::Relaxed),
            missing: self.counters.missing.load(Ordering::Relaxed),
            late: self.counters.late.load(Ordering::Relaxed),
            overflow_dropped: self.counters.overflow_dropped.load(Ordering::Relaxed),
            buffered: inner.slots.len(),
            target_frames: inner.target_frames,
            max_frames: inner.max_frames,
            primed: inner.primed,
        }
    }
}

/// True if `seq` lies strictly behind `reference` under wraparound
/// sequence-number arithmetic (treats the sequence space as a 32-bit ring).
fn seq_before(seq: u32, reference: u32) -> bool {
    let diff = reference.wrapping_sub(seq) as i32;
    diff > 0 && diff < (i32::MAX / 2)
}
