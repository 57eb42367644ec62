//! Timing model - countdown and cue offsets derived from an audio duration.
//!
//! All offsets are milliseconds relative to the start of audio playback.
//! The countdown is a whole number of seconds that ends exactly where the cue
//! starts, and the cue window never runs past the end of the audio.

use serde::{Deserialize, Serialize};

/// Derived schedule for one playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub countdown_start_ms: u64,
    pub countdown_duration_ms: u64,
    pub cue_start_ms: u64,
    pub cue_stop_ms: u64,
    pub audio_duration_ms: u64,
}

impl TimingPlan {
    /// Number of whole seconds shown by the countdown
    pub fn countdown_seconds(&self) -> u64 {
        self.countdown_duration_ms / 1000
    }

    /// Countdown ticks as `(offset_ms, remaining_secs)` in firing order
    ///
    /// For an `n` second countdown the tick at `countdown_start + k*1000`
    /// (`k` in `1..=n`) shows `n - k`. The full value `n` is on screen from
    /// `countdown_start`, and the last tick lands on the cue start showing 0.
    pub fn countdown_ticks(&self) -> Vec<(u64, u64)> {
        let seconds = self.countdown_seconds();
        (1..=seconds)
            .map(|k| (self.countdown_start_ms + k * 1000, seconds - k))
            .collect()
    }
}

/// Compute the timing plan for an instruction
///
/// # Arguments
/// * `cue_start_offset_ms` - Cue offset from the instruction file name
/// * `audio_duration_ms` - Duration reported by the audio player
/// * `ideal_countdown_ms` - Longest countdown to show
/// * `ideal_cue_ms` - How long the cue should stay visible
///
/// # Edge cases
/// - A negative cue offset is treated as zero.
/// - A cue offset beyond the end of the audio is clamped to the audio
///   duration, so the cue window collapses to zero length at the end.
pub fn compute_timing_plan(
    cue_start_offset_ms: i64,
    audio_duration_ms: u64,
    ideal_countdown_ms: u64,
    ideal_cue_ms: u64,
) -> TimingPlan {
    if cue_start_offset_ms < 0 {
        log::warn!(
            "[Timing] Negative cue offset {}ms treated as 0",
            cue_start_offset_ms
        );
    }
    let requested_cue = cue_start_offset_ms.max(0) as u64;

    if requested_cue > audio_duration_ms {
        log::warn!(
            "[Timing] Cue offset {}ms beyond audio end {}ms, clamping",
            requested_cue,
            audio_duration_ms
        );
    }
    let cue_start_ms = requested_cue.min(audio_duration_ms);

    let countdown_duration_ms = ideal_countdown_ms.min((cue_start_ms / 1000) * 1000);
    let countdown_start_ms = cue_start_ms - countdown_duration_ms;
    let cue_stop_ms = audio_duration_ms.min(cue_start_ms.saturating_add(ideal_cue_ms));

    TimingPlan {
        countdown_start_ms,
        countdown_duration_ms,
        cue_start_ms,
        cue_stop_ms,
        audio_duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scenario() {
        let plan = compute_timing_plan(4000, 10_000, 5000, 2000);
        assert_eq!(plan.countdown_start_ms, 0);
        assert_eq!(plan.countdown_duration_ms, 4000);
        assert_eq!(plan.cue_start_ms, 4000);
        assert_eq!(plan.cue_stop_ms, 6000);
        assert_eq!(plan.audio_duration_ms, 10_000);
    }

    #[test]
    fn test_countdown_capped_by_ideal() {
        let plan = compute_timing_plan(9000, 20_000, 5000, 2000);
        assert_eq!(plan.countdown_duration_ms, 5000);
        assert_eq!(plan.countdown_start_ms, 4000);
    }

    #[test]
    fn test_countdown_is_whole_seconds() {
        let plan = compute_timing_plan(3700, 10_000, 5000, 2000);
        assert_eq!(plan.countdown_duration_ms, 3000);
        assert_eq!(plan.countdown_start_ms, 700);
    }

    #[test]
    fn test_cue_stop_clamped_to_audio_end() {
        let plan = compute_timing_plan(4000, 5000, 5000, 2000);
        assert_eq!(plan.cue_stop_ms, 5000);
    }

    #[test]
    fn test_cue_beyond_audio_end_is_clamped() {
        let plan = compute_timing_plan(12_000, 10_000, 5000, 2000);
        assert_eq!(plan.cue_start_ms, 10_000);
        assert_eq!(plan.cue_stop_ms, 10_000);
        assert_eq!(plan.countdown_start_ms + plan.countdown_duration_ms, 10_000);
    }

    #[test]
    fn test_negative_offset_treated_as_zero() {
        let plan = compute_timing_plan(-250, 10_000, 5000, 2000);
        assert_eq!(plan.cue_start_ms, 0);
        assert_eq!(plan.countdown_duration_ms, 0);
        assert_eq!(plan.cue_stop_ms, 2000);
    }

    #[test]
    fn test_countdown_ticks() {
        let plan = compute_timing_plan(4000, 10_000, 5000, 2000);
        assert_eq!(
            plan.countdown_ticks(),
            vec![(1000, 3), (2000, 2), (3000, 1), (4000, 0)]
        );

        let offset = compute_timing_plan(3700, 10_000, 5000, 2000);
        let times: Vec<u64> = offset.countdown_ticks().iter().map(|(at, _)| *at).collect();
        assert_eq!(times, vec![1700, 2700, 3700]);
        assert_eq!(times.last(), Some(&offset.cue_start_ms));

        let short = compute_timing_plan(800, 10_000, 5000, 2000);
        assert!(short.countdown_ticks().is_empty());
    }

    #[test]
    fn test_invariants_hold_across_inputs() {
        for audio in (0..=20_000u64).step_by(1250) {
            for cue in (0..=audio as i64).step_by(333) {
                let plan = compute_timing_plan(cue, audio, 5000, 2000);
                assert_eq!(
                    plan.countdown_start_ms + plan.countdown_duration_ms,
                    cue as u64
                );
                assert!(plan.cue_stop_ms <= audio);
                assert!(plan.cue_stop_ms >= cue as u64);
                assert_eq!(plan.countdown_duration_ms % 1000, 0);
                assert!(plan.countdown_duration_ms <= 5000);
            }
        }
    }
}
