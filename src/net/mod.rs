//! Network receive side: transport variants and network-age accounting.

pub mod age;
pub mod tcp;
pub mod udp;

use std::sync::atomic::AtomicU64;

pub use age::NetworkAgeTracker;

/// Packet/byte/error counters owned by whichever `NetReceiver` variant is
/// active. Lock-free atomics, per §5: "Counters are lock-free atomics."
#[derive(Default)]
pub struct Counters {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub parse_err: AtomicU64,
    pub payload_err: AtomicU64,
    /// Sum of `PacketCodec::parse` durations, in nanoseconds, and the
    /// sample count, so `StatsSampler` can report an average decode time.
    pub decode_ns_sum: AtomicU64,
    pub decode_samples: AtomicU64,
}

impl Counters {
    pub fn record_decode(&self, duration: std::time::Duration) {
        self.decode_ns_sum
            .fetch_add(duration.as_nanos() as u64, std::sync::atomic::Ordering::Relaxed);
        self.decode_samples
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Transport selection for a session, per §6 (`transport ∈ {"udp","tcp"}`,
/// case-insensitive; unknown falls back to UDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("tcp") {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }
}
