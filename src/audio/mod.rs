//! Audio subsystem: jitter buffering and playout.

pub mod jitter_buffer;
pub mod ordered_buffer;
pub mod player;
pub mod sink;

use std::time::Duration;

pub use jitter_buffer::{JitterBuffer, JitterBufferSnapshot};
pub use ordered_buffer::{OrderedBufferSnapshot, OrderedJitterBuffer};
pub use player::Player;
pub use sink::{AudioSink, CpalSink, SinkFormat};

use crate::protocol::AudioFrame;

/// Which jitter-buffer variant a session uses (§9). The default FIFO
/// (`JitterBuffer`) and the opt-in sequence-ordered buffer
/// (`OrderedJitterBuffer`) are never mixed within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferVariant {
    #[default]
    Fifo,
    Ordered,
}

impl BufferVariant {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ordered") {
            BufferVariant::Ordered
        } else {
            BufferVariant::Fifo
        }
    }
}

/// Common playout-buffer contract the `Player` and `StatsSampler` drive
/// against, so they don't need to know which of the two variants (§9) a
/// session picked.
pub trait FrameBuffer: Send + Sync {
    fn push(&self, frame: AudioFrame);
    fn pop(&self, timeout: Duration) -> Option<AudioFrame>;
    fn set_target_frames(&self, target_frames: usize);
    fn target_frames(&self) -> usize;
    fn wake_waiters(&self);
    fn snapshot(&self) -> JitterBufferSnapshot;
}

impl FrameBuffer for JitterBuffer {
    fn push(&self, frame: AudioFrame) {
        JitterBuffer::push(self, frame)
    }

    fn pop(&self, timeout: Duration) -> Option<AudioFrame> {
        JitterBuffer::pop(self, timeout)
    }

    fn set_target_frames(&self, target_frames: usize) {
        JitterBuffer::set_target_frames(self, target_frames)
    }

    fn target_frames(&self) -> usize {
        JitterBuffer::target_frames(self)
    }

    fn wake_waiters(&self) {
        JitterBuffer::wake_waiters(self)
    }

    fn snapshot(&self) -> JitterBufferSnapshot {
        JitterBuffer::snapshot(self)
    }
}

impl FrameBuffer for OrderedJitterBuffer {
    fn push(&self, frame: AudioFrame) {
        OrderedJitterBuffer::push(self, frame)
    }

    fn pop(&self, timeout: Duration) -> Option<AudioFrame> {
        OrderedJitterBuffer::pop(self, timeout)
    }

    fn set_target_frames(&self, target_frames: usize) {
        OrderedJitterBuffer::set_target_frames(self, target_frames)
    }

    fn target_frames(&self) -> usize {
        OrderedJitterBuffer::target_frames(self)
    }

    fn wake_waiters(&self) {
        OrderedJitterBuffer::wake_waiters(self)
    }

    fn snapshot(&self) -> JitterBufferSnapshot {
        let s = OrderedJitterBuffer::snapshot(self);
        JitterBufferSnapshot {
            pushed: s.pushed,
            played: s.played,
            missing: s.missing,
            late: s.late,
            overflow_dropped: s.overflow_dropped,
            buffered: s.buffered,
            target_frames: s.target_frames,
            max_frames: s.max_frames,
            primed: s.primed,
        }
    }
}
