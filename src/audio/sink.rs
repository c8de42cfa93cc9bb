//! Audio output sink.
//!
//! Per §1, the audio-output device driver is an external collaborator: the
//! only assumed contract is "blocking write of an interleaved PCM16 frame of
//! fixed sample count". `AudioSink` captures that contract; `CpalSink` is the
//! concrete implementation backed by `cpal`.
//!
//! As in `audio/playback.rs::AudioPlayback`, the `cpal` device and stream
//! are built and kept alive entirely on one dedicated thread spawned from
//! `open()` — `cpal::Stream` itself never crosses a thread boundary.
//! Cross-thread handoff of samples goes through a
//! `parking_lot::Mutex`/`Condvar`-guarded single slot, matching the jitter
//! buffer's and volume control's synchronization style.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::{Condvar, Mutex};

use crate::error::AudioSinkError;

/// Parameters the session learns from the first valid wire packet.
#[derive(Debug, Clone, Copy)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples_per_channel: u16,
}

impl SinkFormat {
    pub fn frame_len(&self) -> usize {
        self.samples_per_channel as usize * self.channels as usize
    }
}

/// Contract assumed of the audio-output device.
pub trait AudioSink: Send + Sync {
    /// Open the device for the given format, requesting a device buffer of
    /// at least `min_buffer_bytes`.
    fn open(&mut self, format: SinkFormat, min_buffer_bytes: usize) -> Result<(), AudioSinkError>;

    /// Write one frame's worth of interleaved PCM16 samples. Blocks until
    /// the device has consumed (or buffered) the frame; this blocking call
    /// is the playout pacing mechanism.
    fn write_frame(&self, samples: &[i16]);

    /// Release the device.
    fn close(&mut self);
}

struct SlotState {
    samples: Vec<i16>,
    consumed: bool,
}

/// Single-slot mutex/condvar handoff: the player thread blocks in
/// `write_frame` until the cpal output callback has drained the slot.
struct Handoff {
    state: Mutex<SlotState>,
    drained: Condvar,
}

impl Handoff {
    fn new(frame_len: usize) -> Self {
        Self {
            state: Mutex::new(SlotState {
                samples: vec![0; frame_len],
                consumed: true,
            }),
            drained: Condvar::new(),
        }
    }

    fn push_blocking(&self, samples: &[i16]) {
        let mut state = self.state.lock();
        while !state.consumed {
            self.drained.wait(&mut state);
        }
        state.samples.clear();
        state.samples.extend_from_slice(samples);
        state.consumed = false;
    }

    /// Called from the cpal callback: drains whatever is pending (or
    /// silence, if the player hasn't produced a frame yet) into `out`.
    fn pull_into(&self, out: &mut [i16]) {
        let mut state = self.state.lock();
        let n = out.len().min(state.samples.len());
        out[..n].copy_from_slice(&state.samples[..n]);
        for sample in &mut out[n..] {
            *sample = 0;
        }
        if !state.consumed {
            state.consumed = true;
            self.drained.notify_one();
        }
    }
}

/// `cpal`-backed implementation of `AudioSink`. The device and stream live
/// on their own thread, spawned in `open()` and joined in `close()`.
pub struct CpalSink {
    handoff: Option<Arc<Handoff>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    underruns: Arc<AtomicU64>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            handoff: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: None,
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, format: SinkFormat, min_buffer_bytes: usize) -> Result<(), AudioSinkError> {
        let handoff = Arc::new(Handoff::new(format.frame_len()));
        let handoff_thread = handoff.clone();
        let shutdown = self.shutdown.clone();
        let underruns = self.underruns.clone();

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioSinkError>>(1);

        let thread = std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let build_result = build_and_play(format, min_buffer_bytes, handoff_thread, underruns);
                let stream = match build_result {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while !shutdown.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(20));
                }
                drop(stream);
            })
            .expect("failed to spawn audio-output thread");

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handoff = Some(handoff);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioSinkError::StreamError(
                    "audio output thread exited before reporting readiness".into(),
                ))
            }
        }
    }

    fn write_frame(&self, samples: &[i16]) {
        if let Some(handoff) = &self.handoff {
            handoff.push_blocking(samples);
        }
    }

    fn close(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.handoff = None;
    }
}

fn build_and_play(
    format: SinkFormat,
    min_buffer_bytes: usize,
    handoff: Arc<Handoff>,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioSinkError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioSinkError::NoDevice)?;

    let min_frames =
        (min_buffer_bytes / crate::constants::BYTES_PER_SAMPLE) / format.channels.max(1) as usize;
    let buffer_size = if min_frames > 0 {
        cpal::BufferSize::Fixed(min_frames as u32)
    } else {
        cpal::BufferSize::Default
    };

    let stream_config = cpal::StreamConfig {
        channels: format.channels as u16,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| {
                handoff.pull_into(data);
            },
            move |err| {
                underruns.fetch_add(1, Ordering::Relaxed);
                tracing::error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioSinkError::BuildStreamFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioSinkError::PlayFailed(e.to_string()))?;

    Ok(stream)
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Precomputed silence frame, reused across underrun/mismatch substitutions
/// rather than reallocating per frame (§4.5).
pub fn silence_frame(len: usize) -> Vec<i16> {
    vec![0; len]
}
