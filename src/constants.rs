//! Tunable constants for the receiver pipeline.
//!
//! These are compile-time knobs rather than a loaded configuration file:
//! the only per-session configuration is `SessionConfig` (port, jitter_ms,
//! transport), and there is no persisted state.

/// Magic bytes identifying a wire packet, per §4.1.
pub const PACKET_MAGIC: [u8; 4] = *b"AUD0";

/// Protocol version this codec accepts.
pub const PROTOCOL_VERSION: u8 = 1;

/// Only codec accepted: raw interleaved PCM16LE.
pub const CODEC_PCM16LE: u8 = 0;

/// Fixed wire header size in bytes.
pub const HEADER_SIZE: usize = 28;

/// UDP receive scratch buffer size.
pub const UDP_RECV_BUFFER_BYTES: usize = 8 * 1024;

/// UDP socket receive buffer (SO_RCVBUF) size.
pub const UDP_SOCKET_RECV_BUFFER_BYTES: usize = 256 * 1024;

/// UDP socket receive timeout, bounding how long `recv_from` blocks so the
/// loop can observe shutdown.
pub const UDP_RECV_TIMEOUT_MS: u64 = 500;

/// TCP accept timeout, bounding how long `accept` blocks so the loop can
/// observe shutdown.
pub const TCP_ACCEPT_TIMEOUT_MS: u64 = 800;

/// TCP per-connection read timeout.
pub const TCP_READ_TIMEOUT_MS: u64 = 1500;

/// Maximum accepted TCP frame length (length-prefix field is a u16).
pub const TCP_MAX_FRAME_LEN: usize = 65535;

/// Default jitter-buffer hard cap headroom above the adaptive ceiling.
pub const JITTER_MAX_FRAMES_HEADROOM: usize = 4;

/// Default jitter-buffer hard cap headroom above the base target.
pub const JITTER_MAX_FRAMES_BASE_HEADROOM: usize = 16;

/// Adaptive controller: how many frames above `min_target_frames` the
/// adaptive ceiling may reach, relative to the base target.
pub const ADAPTIVE_CEILING_ABOVE_BASE: usize = 8;

/// Adaptive controller: absolute hard ceiling on target frames.
pub const ADAPTIVE_ABSOLUTE_MAX_TARGET: usize = 32;

/// Network age is rejected as out-of-range once it exceeds this many
/// microseconds (5 s), guarding against clock skew or corrupt timestamps.
pub const MAX_PLAUSIBLE_AGE_US: i64 = 5_000_000;

/// Length of the StatsSampler window.
pub const STATS_WINDOW: std::time::Duration = std::time::Duration::from_secs(1);

/// Cooldown applied (in windows) after any adaptive target change.
pub const ADAPTIVE_COOLDOWN_WINDOWS: u32 = 2;

/// Consecutive good windows required before the controller will lower target.
pub const ADAPTIVE_GOOD_STREAK_TO_LOWER: u32 = 8;

/// Extra frames above base_target beyond which lowering steps by 2 instead of 1.
pub const ADAPTIVE_LOWER_STEP2_THRESHOLD: usize = 3;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;
