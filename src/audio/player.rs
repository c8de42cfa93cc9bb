//! Playout thread: pulls primed frames from the jitter buffer and writes
//! them to the `AudioSink`, blocking on the write as the pacing mechanism
//! (§4.5). Follows the `audio/playback.rs::AudioPlayback` output thread,
//! generalized from a push-driven ring buffer to a pull-from-jitter-buffer
//! loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::sink::{silence_frame, AudioSink};
use crate::audio::FrameBuffer;

/// Counters the player contributes to the per-window telemetry line (§6).
#[derive(Default)]
pub struct PlayerCounters {
    pub underruns: AtomicU64,
    pub payload_errs: AtomicU64,
    pub frames_played: AtomicU64,
}

impl PlayerCounters {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.underruns.load(Ordering::Relaxed),
            self.payload_errs.load(Ordering::Relaxed),
            self.frames_played.load(Ordering::Relaxed),
        )
    }
}

/// Drives the playout loop on its own OS thread until told to stop.
pub struct Player {
    running: Arc<AtomicBool>,
    counters: Arc<PlayerCounters>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    /// Spawn the playout thread. `expected_len` is the sample count every
    /// frame must carry (channels * samples_per_channel, learned at session
    /// init); frames whose payload length disagrees are substituted with
    /// silence and counted as a payload error rather than fed to the sink.
    pub fn spawn(
        jitter_buffer: Arc<dyn FrameBuffer>,
        sink: Arc<dyn AudioSink>,
        expected_len: usize,
        pop_timeout: Duration,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(PlayerCounters::default());

        let running_thread = running.clone();
        let counters_thread = counters.clone();
        let silence = silence_frame(expected_len);

        let handle = std::thread::Builder::new()
            .name("audio-player".into())
            .spawn(move || {
                while running_thread.load(Ordering::Relaxed) {
                    match jitter_buffer.pop(pop_timeout) {
                        Some(frame) => {
                            if frame.payload.len() == expected_len {
                                sink.write_frame(&frame.payload);
                            } else {
                                counters_thread.payload_errs.fetch_add(1, Ordering::Relaxed);
                                sink.write_frame(&silence);
                            }
                            counters_thread.frames_played.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            counters_thread.underruns.fetch_add(1, Ordering::Relaxed);
                            sink.write_frame(&silence);
                        }
                    }
                }
            })
            .expect("failed to spawn audio-player thread");

        Self {
            running,
            counters,
            handle: Some(handle),
        }
    }

    pub fn counters(&self) -> Arc<PlayerCounters> {
        self.counters.clone()
    }

    /// Signal the playout loop to stop and join its thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `pop_timeout = max(10ms, 2 * frame duration)`, per §4.5.
pub fn pop_timeout_for_frame_ms(frame_ms: u64) -> Duration {
    Duration::from_millis((frame_ms * 2).max(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::jitter_buffer::JitterBuffer;
    use crate::protocol::AudioFrame;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        written: StdMutex<Vec<Vec<i16>>>,
    }

    impl AudioSink for RecordingSink {
        fn open(
            &mut self,
            _format: crate::audio::sink::SinkFormat,
            _min_buffer_bytes: usize,
        ) -> Result<(), crate::error::AudioSinkError> {
            Ok(())
        }

        fn write_frame(&self, samples: &[i16]) {
            self.written.lock().unwrap().push(samples.to_vec());
        }

        fn close(&mut self) {}
    }

    fn frame(seq: u32, payload: Vec<i16>) -> AudioFrame {
        AudioFrame {
            sample_rate: 48_000,
            channels: 1,
            seq,
            send_time_us: 0,
            samples_per_channel: payload.len() as u16,
            payload,
        }
    }

    #[test]
    fn plays_frames_and_substitutes_silence_on_mismatch() {
        let jb: Arc<dyn FrameBuffer> = Arc::new(JitterBuffer::new(2, 8));
        let sink: Arc<dyn AudioSink> = Arc::new(RecordingSink {
            written: StdMutex::new(Vec::new()),
        });

        jb.push(frame(0, vec![1, 2, 3, 4]));
        jb.push(frame(1, vec![5, 6])); // wrong length: expected_len is 4

        let mut player = Player::spawn(jb, sink.clone(), 4, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(150));
        player.stop();

        let (_underruns, payload_errs, frames_played) = player.counters().snapshot();
        assert!(payload_errs >= 1);
        assert!(frames_played >= 1);
    }

    #[test]
    fn pop_timeout_uses_frame_duration_floor() {
        assert_eq!(pop_timeout_for_frame_ms(2), Duration::from_millis(10));
        assert_eq!(pop_timeout_for_frame_ms(10), Duration::from_millis(20));
    }
}
