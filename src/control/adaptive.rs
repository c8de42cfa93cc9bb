//! Adaptive jitter controller (§4.3). Invoked once per window by
//! `StatsSampler`; its state is mutated only from that thread, per §5.

use crate::constants::{
    ADAPTIVE_ABSOLUTE_MAX_TARGET, ADAPTIVE_CEILING_ABOVE_BASE, ADAPTIVE_COOLDOWN_WINDOWS,
    ADAPTIVE_GOOD_STREAK_TO_LOWER,
};

/// Per-window counter deltas and current occupancy fed into the controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowDeltas {
    pub underrun: u64,
    pub missing: u64,
    pub parse_err: u64,
    pub payload_err: u64,
    pub overflow: u64,
    pub buffered: usize,
}

/// Outcome of one `step()` call: the window's raw score, the updated EMA,
/// and — if the cooldown-gated policy decided to move — a new target and
/// the reason string used verbatim in telemetry (§6).
#[derive(Debug, Clone)]
pub struct StepResult {
    pub score: f64,
    pub score_ema: f64,
    pub new_target: Option<usize>,
    pub reason: &'static str,
}

/// `AdaptiveControllerState` (§3): target bounds derived once at audio-init
/// from the session's `jitter_ms` / `frame_ms`, then held fixed for the
/// session's lifetime.
pub struct AdaptiveController {
    pub base_target_frames: usize,
    pub min_target_frames: usize,
    pub max_target_frames: usize,
    target_frames: usize,
    score_ema: f64,
    bad_streak: u32,
    good_streak: u32,
    zero_buffer_streak: u32,
    cooldown_sec: u32,
}

impl AdaptiveController {
    pub fn new(base_target_frames: usize) -> Self {
        let min_target_frames = base_target_frames.max(2).saturating_sub(1).max(2);
        let max_target_frames = (min_target_frames + 2).max(
            (base_target_frames + ADAPTIVE_CEILING_ABOVE_BASE).min(ADAPTIVE_ABSOLUTE_MAX_TARGET),
        );
        Self {
            base_target_frames,
            min_target_frames,
            max_target_frames,
            target_frames: base_target_frames.clamp(min_target_frames, max_target_frames),
            score_ema: 100.0,
            bad_streak: 0,
            good_streak: 0,
            zero_buffer_streak: 0,
            cooldown_sec: 0,
        }
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }

    pub fn score_ema(&self) -> f64 {
        self.score_ema
    }

    /// Run one window's worth of scoring, streak updates, and (if the
    /// cooldown allows) target adjustment. Mirrors the formula in §4.3
    /// exactly, including clamp order.
    pub fn step(&mut self, deltas: WindowDeltas) -> StepResult {
        let half_target = (self.target_frames / 2).max(1);
        let deficit = half_target.saturating_sub(deltas.buffered) as f64;

        let mut score = 100.0
            - 25.0 * deltas.underrun as f64
            - 18.0 * deltas.missing as f64
            - 50.0 * deltas.parse_err as f64
            - 40.0 * deltas.payload_err as f64
            - 2.0 * deltas.overflow as f64
            - deficit * 3.0;
        score = score.clamp(0.0, 100.0);
        self.score_ema = 0.85 * self.score_ema + 0.15 * score;

        let bad_now = deltas.underrun > 0
            || deltas.missing > 0
            || deltas.parse_err > 0
            || deltas.payload_err > 0
            || self.score_ema < 90.0;
        let good_now = !bad_now
            && deltas.overflow == 0
            && self.score_ema > 97.0
            && deltas.buffered >= half_target
            && deltas.buffered > 0;

        if deltas.buffered == 0 {
            self.zero_buffer_streak += 1;
        } else {
            self.zero_buffer_streak = 0;
        }
        if bad_now {
            self.bad_streak += 1;
        } else {
            self.bad_streak = self.bad_streak.saturating_sub(1);
        }
        if good_now {
            self.good_streak += 1;
        } else {
            self.good_streak = 0;
        }

        let mut new_target = None;
        let mut reason = "hold";

        if self.cooldown_sec == 0 {
            let severe = deltas.underrun >= 2
                || deltas.missing >= 2
                || deltas.parse_err > 0
                || deltas.payload_err > 0;
            let raise_by_buffer = self.zero_buffer_streak >= 2;

            if (self.bad_streak >= 1 || raise_by_buffer) && self.target_frames < self.max_target_frames {
                let step = if severe || self.zero_buffer_streak >= 3 { 2 } else { 1 };
                let candidate = (self.target_frames + step).clamp(self.min_target_frames, self.max_target_frames);
                new_target = Some(candidate);
                reason = if severe { "raise-severe" } else { "raise" };
            } else if self.good_streak >= ADAPTIVE_GOOD_STREAK_TO_LOWER && self.target_frames > self.min_target_frames {
                let step = if self.target_frames > self.base_target_frames + 3 { 2 } else { 1 };
                let candidate = self
                    .target_frames
                    .saturating_sub(step)
                    .clamp(self.min_target_frames, self.max_target_frames);
                new_target = Some(candidate);
                reason = "lower-stable";
            }

            if let Some(target) = new_target {
                self.target_frames = target;
                self.bad_streak = 0;
                self.good_streak = 0;
                self.zero_buffer_streak = 0;
                self.cooldown_sec = ADAPTIVE_COOLDOWN_WINDOWS;
            }
        } else {
            self.cooldown_sec -= 1;
        }

        StepResult {
            score,
            score_ema: self.score_ema,
            new_target,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_bounds_follow_base() {
        let c = AdaptiveController::new(4);
        assert_eq!(c.min_target_frames, 3);
        assert_eq!(c.max_target_frames, 4 + ADAPTIVE_CEILING_ABOVE_BASE);
        assert_eq!(c.target_frames(), 4);
    }

    #[test]
    fn severe_window_raises_target_by_two() {
        let mut c = AdaptiveController::new(4);
        let result = c.step(WindowDeltas {
            underrun: 3,
            buffered: 4,
            ..Default::default()
        });
        assert_eq!(result.new_target, Some(6));
        assert_eq!(result.reason, "raise-severe");
    }

    #[test]
    fn cooldown_blocks_immediate_second_adjustment() {
        let mut c = AdaptiveController::new(4);
        let first = c.step(WindowDeltas {
            underrun: 3,
            buffered: 4,
            ..Default::default()
        });
        assert!(first.new_target.is_some());
        let second = c.step(WindowDeltas {
            underrun: 3,
            buffered: 4,
            ..Default::default()
        });
        assert_eq!(second.new_target, None);
    }

    #[test]
    fn sustained_good_streak_lowers_target() {
        let mut c = AdaptiveController::new(6);
        for _ in 0..12 {
            let result = c.step(WindowDeltas {
                buffered: 6,
                ..Default::default()
            });
            if result.new_target.is_some() {
                assert_eq!(result.reason, "lower-stable");
                return;
            }
        }
        panic!("expected a lower-stable adjustment within 12 good windows");
    }

    #[test]
    fn score_and_ema_always_stay_in_range() {
        let mut c = AdaptiveController::new(4);
        for _ in 0..50 {
            let result = c.step(WindowDeltas {
                underrun: 10,
                missing: 10,
                parse_err: 10,
                payload_err: 10,
                overflow: 10,
                buffered: 0,
            });
            assert!(result.score >= 0.0 && result.score <= 100.0);
            assert!(result.score_ema >= 0.0 && result.score_ema <= 100.0);
        }
    }
}
