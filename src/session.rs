//! SessionSupervisor (§4.7): owns one session's four threads (NetReceiver,
//! Player, StatsSampler, plus the caller as the command thread), and the
//! lazy audio initialization triggered by the first valid frame.
//!
//! Follows `bin/receiver.rs`'s track lifecycle (spawn per-track
//! decode/jitter/playback state on first packet) and the cyclic-teardown
//! note in §9: NetReceiver only flips `running` and closes its own socket
//! on a fatal error; only this supervisor joins threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::audio::jitter_buffer::JitterBuffer;
use crate::audio::ordered_buffer::OrderedJitterBuffer;
use crate::audio::player::Player;
use crate::audio::sink::{AudioSink, CpalSink, SinkFormat};
use crate::audio::{BufferVariant, FrameBuffer};
use crate::constants::{
    BYTES_PER_SAMPLE, JITTER_MAX_FRAMES_BASE_HEADROOM, JITTER_MAX_FRAMES_HEADROOM,
};
use crate::control::adaptive::AdaptiveController;
use crate::control::stats::{self, StatsInputs};
use crate::error::Result;
use crate::net::{self, NetworkAgeTracker, Transport};
use crate::protocol::AudioFrame;

/// Where a `NetReceiver` variant hands accepted frames: lazy audio init
/// happens behind this call on the first successfully parsed frame.
pub trait FrameSink: Send + Sync {
    /// Returns `false` if the frame was rejected post-init (payload length
    /// mismatch against the learned format) — the caller counts that as a
    /// `payload_err`. Returns `true` once the frame has been pushed to the
    /// jitter buffer (or queued as part of lazy init).
    fn accept(&self, frame: AudioFrame) -> bool;
}

/// Immutable per-session configuration (§3).
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub port: u16,
    pub initial_jitter_ms: u32,
    pub transport: Transport,
    /// Which jitter-buffer variant (§9) this session plays out through.
    pub buffer_variant: BufferVariant,
}

struct AudioState {
    jitter: Arc<dyn FrameBuffer>,
    player: Player,
    controller: Arc<Mutex<AdaptiveController>>,
    expected_len: usize,
    frame_ms: u64,
}

struct Shared {
    config: SessionConfig,
    running: Arc<AtomicBool>,
    net_counters: Arc<net::Counters>,
    age_tracker: Arc<NetworkAgeTracker>,
    audio: Mutex<Option<AudioState>>,
}

impl Shared {
    fn lazy_init(&self, frame: &AudioFrame) -> Result<AudioState> {
        let frame_ms = (frame.samples_per_channel as u64 * 1000 / frame.sample_rate.max(1) as u64).max(1);
        let base_target_frames =
            (self.config.initial_jitter_ms as u64 / frame_ms).max(2) as usize;

        let controller = AdaptiveController::new(base_target_frames);
        let max_frames = (base_target_frames + JITTER_MAX_FRAMES_BASE_HEADROOM)
            .max(controller.max_target_frames + JITTER_MAX_FRAMES_HEADROOM);

        let jitter: Arc<dyn FrameBuffer> = match self.config.buffer_variant {
            BufferVariant::Fifo => Arc::new(JitterBuffer::new(base_target_frames, max_frames)),
            BufferVariant::Ordered => {
                Arc::new(OrderedJitterBuffer::new(base_target_frames, max_frames))
            }
        };

        let expected_len = frame.expected_len();
        // §4.7: device buffer >= samples_per_channel * channels * 2 * (max_frames + 2).
        let min_buffer_bytes = frame.samples_per_channel as usize
            * frame.channels as usize
            * BYTES_PER_SAMPLE
            * (max_frames + 2);

        let mut cpal_sink = CpalSink::new();
        cpal_sink.open(
            SinkFormat {
                sample_rate: frame.sample_rate,
                channels: frame.channels,
                samples_per_channel: frame.samples_per_channel,
            },
            min_buffer_bytes,
        )?;
        let sink: Arc<dyn AudioSink> = Arc::new(cpal_sink);

        let pop_timeout = crate::audio::player::pop_timeout_for_frame_ms(frame_ms);
        let player = Player::spawn(jitter.clone(), sink, expected_len, pop_timeout);

        Ok(AudioState {
            jitter,
            player,
            controller: Arc::new(Mutex::new(controller)),
            expected_len,
            frame_ms,
        })
    }
}

impl FrameSink for Shared {
    fn accept(&self, frame: AudioFrame) -> bool {
        let mut audio = self.audio.lock();
        if audio.is_none() {
            match self.lazy_init(&frame) {
                Ok(state) => *audio = Some(state),
                Err(e) => {
                    tracing::error!("audio init failed, ending session: {e}");
                    self.running.store(false, Ordering::Relaxed);
                    return false;
                }
            }
        }
        let state = audio.as_ref().expect("just initialized");

        self.age_tracker.record(frame.send_time_us);

        if frame.payload.len() != state.expected_len {
            return false;
        }
        state.jitter.push(frame);
        true
    }
}

/// Owns a session's threads end-to-end. Idempotent `start`/`stop` (§4.7).
pub struct SessionSupervisor {
    shared: Option<Arc<Shared>>,
    net_thread: Option<JoinHandle<()>>,
    stats_thread: Option<JoinHandle<()>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            shared: None,
            net_thread: None,
            stats_thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_some()
    }

    /// Start a session. A redundant `start` while already running is
    /// ignored, per §4.7.
    pub fn start(&mut self, config: SessionConfig) -> Result<()> {
        if self.shared.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let net_counters = Arc::new(net::Counters::default());
        let age_tracker = Arc::new(NetworkAgeTracker::new());

        let shared = Arc::new(Shared {
            config,
            running: running.clone(),
            net_counters: net_counters.clone(),
            age_tracker: age_tracker.clone(),
            audio: Mutex::new(None),
        });

        let sink: Arc<dyn FrameSink> = shared.clone();

        let net_thread = match config.transport {
            Transport::Udp => {
                let socket = net::udp::bind(config.port)?;
                let running = running.clone();
                let counters = net_counters.clone();
                std::thread::Builder::new()
                    .name("net-receiver-udp".into())
                    .spawn(move || net::udp::run(socket, running, counters, sink))
                    .expect("failed to spawn net-receiver-udp thread")
            }
            Transport::Tcp => {
                let listener = net::tcp::bind(config.port)?;
                let running = running.clone();
                let counters = net_counters.clone();
                std::thread::Builder::new()
                    .name("net-receiver-tcp".into())
                    .spawn(move || net::tcp::run(listener, running, counters, sink))
                    .expect("failed to spawn net-receiver-tcp thread")
            }
        };

        let stats_shared = shared.clone();
        let stats_running = running.clone();
        let stats_thread = std::thread::Builder::new()
            .name("stats-sampler".into())
            .spawn(move || {
                // Wait for lazy audio init before sampling, per §9: pop/stats
                // before init are undefined.
                let inputs = loop {
                    if !stats_running.load(Ordering::Relaxed) {
                        return;
                    }
                    let audio = stats_shared.audio.lock();
                    if let Some(state) = audio.as_ref() {
                        break StatsInputs {
                            jitter: state.jitter.clone(),
                            net_counters: stats_shared.net_counters.clone(),
                            player_counters: state.player.counters(),
                            age_tracker: stats_shared.age_tracker.clone(),
                            controller: state.controller.clone(),
                            frame_ms: state.frame_ms,
                        };
                    }
                    drop(audio);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                };
                stats::run(inputs, stats_running);
            })
            .expect("failed to spawn stats-sampler thread");

        self.shared = Some(shared);
        self.net_thread = Some(net_thread);
        self.stats_thread = Some(stats_thread);
        Ok(())
    }

    /// Stop the session: flip `running`, close sockets (unblocks
    /// accept/recv), wake jitter-buffer waiters, join threads, release the
    /// audio sink. A redundant `stop` while not running is a no-op.
    pub fn stop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        shared.running.store(false, Ordering::Relaxed);

        if let Some(state) = shared.audio.lock().as_ref() {
            state.jitter.wake_waiters();
        }

        if let Some(handle) = self.net_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stats_thread.take() {
            let _ = handle.join();
        }

        let mut audio = shared.audio.lock();
        if let Some(mut state) = audio.take() {
            state.player.stop();
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
