//! StatsSampler (§4.6): once per second, reads counter deltas across the
//! pipeline, invokes the adaptive controller, and emits the telemetry lines
//! specified in §6. Follows `bin/receiver.rs`'s periodic stats-logging loop
//! (a 5 s `tracing::info!` tick over track counters), generalized to the
//! single-session counters here and the exact field set named in §6.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::player::PlayerCounters;
use crate::audio::FrameBuffer;
use crate::constants::STATS_WINDOW;
use crate::control::adaptive::{AdaptiveController, WindowDeltas};
use crate::net::{Counters as NetCounters, NetworkAgeTracker};

/// Raw cumulative totals read at the end of a window, carried forward so
/// the next window can compute a delta.
#[derive(Default, Clone, Copy)]
struct Totals {
    packets: u64,
    bytes: u64,
    parse_err: u64,
    payload_err: u64,
    decode_ns_sum: u64,
    decode_samples: u64,
    missing: u64,
    late: u64,
    overflow_dropped: u64,
    underrun: u64,
    player_payload_err: u64,
}

/// Handles needed to sample one session's worth of counters each window.
/// Constructed once lazy audio init completes; `frame_ms`/`base_target`
/// are fixed for the session.
pub struct StatsInputs {
    pub jitter: Arc<dyn FrameBuffer>,
    pub net_counters: Arc<NetCounters>,
    pub player_counters: Arc<PlayerCounters>,
    pub age_tracker: Arc<NetworkAgeTracker>,
    pub controller: Arc<Mutex<AdaptiveController>>,
    pub frame_ms: u64,
}

/// Runs the 1-second sampling loop until `running` is cleared. Sleep is
/// checked in short slices so shutdown is observed promptly (§5: "sleep is
/// interruptible").
pub fn run(inputs: StatsInputs, running: Arc<std::sync::atomic::AtomicBool>) {
    let mut prev = Totals::default();

    while running.load(Ordering::Relaxed) {
        if !sleep_interruptible(STATS_WINDOW, &running) {
            break;
        }

        let jitter_snapshot = inputs.jitter.snapshot();
        let (player_underrun, player_payload_err, _frames_played) =
            inputs.player_counters.snapshot();

        let current = Totals {
            packets: inputs.net_counters.packets.load(Ordering::Relaxed),
            bytes: inputs.net_counters.bytes.load(Ordering::Relaxed),
            parse_err: inputs.net_counters.parse_err.load(Ordering::Relaxed),
            payload_err: inputs.net_counters.payload_err.load(Ordering::Relaxed),
            decode_ns_sum: inputs.net_counters.decode_ns_sum.load(Ordering::Relaxed),
            decode_samples: inputs.net_counters.decode_samples.load(Ordering::Relaxed),
            missing: jitter_snapshot.missing as u64,
            late: jitter_snapshot.late as u64,
            overflow_dropped: jitter_snapshot.overflow_dropped as u64,
            underrun: player_underrun,
            player_payload_err,
        };

        let delta = Totals {
            packets: current.packets - prev.packets,
            bytes: current.bytes - prev.bytes,
            parse_err: current.parse_err - prev.parse_err,
            payload_err: (current.payload_err - prev.payload_err)
                + (current.player_payload_err - prev.player_payload_err),
            decode_ns_sum: current.decode_ns_sum - prev.decode_ns_sum,
            decode_samples: current.decode_samples - prev.decode_samples,
            missing: current.missing - prev.missing,
            late: current.late - prev.late,
            overflow_dropped: current.overflow_dropped - prev.overflow_dropped,
            underrun: current.underrun - prev.underrun,
            player_payload_err: 0,
        };
        prev = current;

        let window_deltas = WindowDeltas {
            underrun: delta.underrun,
            missing: delta.missing,
            parse_err: delta.parse_err,
            payload_err: delta.payload_err,
            overflow: delta.overflow_dropped,
            buffered: jitter_snapshot.buffered,
        };

        let step = {
            let mut controller = inputs.controller.lock();
            let step = controller.step(window_deltas);
            if let Some(new_target) = step.new_target {
                inputs.jitter.set_target_frames(new_target);
            }
            step
        };

        let controller = inputs.controller.lock();
        let base_target = controller.base_target_frames;
        let target = inputs.jitter.target_frames();
        drop(controller);

        let pps = delta.packets as f64 / STATS_WINDOW.as_secs_f64();
        let kbps = (delta.bytes as f64 * 8.0 / 1000.0) / STATS_WINDOW.as_secs_f64();
        let net_age_ms = inputs.age_tracker.take_avg_age_us() as f64 / 1000.0;
        let net_path_ms = inputs.age_tracker.take_avg_path_us() as f64 / 1000.0;
        let net_jit_ms = inputs.age_tracker.take_jitter_accum_us() as f64 / 1000.0;
        let decode_ms = if delta.decode_samples > 0 {
            (delta.decode_ns_sum as f64 / delta.decode_samples as f64) / 1_000_000.0
        } else {
            0.0
        };
        let buffer_ms = jitter_snapshot.buffered as f64 * inputs.frame_ms as f64;
        let target_ms = target as f64 * inputs.frame_ms as f64;
        let base_target_ms = base_target as f64 * inputs.frame_ms as f64;
        let e2e_ms = net_path_ms.max(net_age_ms) + decode_ms + buffer_ms;

        tracing::info!(
            "stats rx={pps:.1} {kbps:.1} kbps delay={net_age_ms:.1} ms buffer={buffer_ms:.1} ms \
             loss={missing} late={late} over={overflow} underrun={underrun} parseErr={parse_err} payloadErr={payload_err}",
            missing = delta.missing,
            late = delta.late,
            overflow = delta.overflow_dropped,
            underrun = delta.underrun,
            parse_err = delta.parse_err,
            payload_err = delta.payload_err,
        );
        tracing::info!(
            "autojitter target={target} ({target_ms:.1}ms) base={base_target} ({base_target_ms:.1}ms) \
             score={score_ema:.1} win={score:.1} reason={reason}",
            score_ema = step.score_ema,
            score = step.score,
            reason = step.reason,
        );
        tracing::info!(
            "perf netAge={net_age_ms:.1} ms netPath={net_path_ms:.1} ms netJit={net_jit_ms:.1} ms \
             decode={decode_ms:.2} ms playout={buffer_ms:.1} ms e2e={e2e_ms:.1} ms"
        );
    }
}

/// Sleeps in short slices, rechecking `running`, so a STOP is observed
/// within a fraction of a second rather than up to the full window.
fn sleep_interruptible(total: Duration, running: &std::sync::atomic::AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    running.load(Ordering::Relaxed)
}
