// Sliding-window speed estimator over the decoder's reconstructed position.
//
// An 8-tap ring of (position, tick_us) samples is advanced at most once per
// `SAMPLE_INTERVAL_US`; `getSpeed()` compares the newest sample against the
// one `taps` slots behind it, scaled to counts/sec. A gap far larger than
// the window (stall, or a fresh start) resets the whole ring rather than
// reporting a stale rate.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

const TAPS: usize = 8;

/// Minimum spacing, in microseconds, between two samples that advance the
/// window. Matches the original `QDecSpeed::sampleInterval`.
pub const SAMPLE_INTERVAL_US: u32 = 5000;

/// A gap since the last advance bigger than this is treated as a stall or
/// a restart: the window is refilled with the current sample instead of
/// reporting a rate computed across the gap.
const STALL_GAP_US: u32 = SAMPLE_INTERVAL_US * TAPS as u32 * 10;

/// Ring-buffer speed estimator. Call `update` once per control tick with
/// the latest position and a free-running microsecond tick; read
/// `speed()` for the counts/sec estimate.
pub struct SpeedEstimator {
    position_history: [i64; TAPS],
    tick_history: [u32; TAPS],
    window_pos: usize,
    position_delta: i64,
    time_delta_us: i32,
}

impl SpeedEstimator {
    pub fn new(position: i64, tick_us: u32) -> Self {
        let mut estimator = Self {
            position_history: [0; TAPS],
            tick_history: [0; TAPS],
            window_pos: 0,
            position_delta: 0,
            time_delta_us: 0,
        };
        estimator.reset(position, tick_us);
        estimator
    }

    /// Refills every slot with `(position, tick_us)`, zeroing the current
    /// rate estimate. Used on construction and on stall/restart detection.
    pub fn reset(&mut self, position: i64, tick_us: u32) {
        for i in 0..TAPS {
            self.position_history[i] = position;
            self.tick_history[i] = tick_us;
        }
        self.window_pos = 0;
        self.position_delta = 0;
        self.time_delta_us = 0;
    }

    /// Advances the window if at least `SAMPLE_INTERVAL_US` has elapsed
    /// since the sample at the current window position; resets on a gap
    /// larger than `STALL_GAP_US`.
    pub fn update(&mut self, position: i64, tick_us: u32) {
        let elapsed = tick_us.wrapping_sub(self.tick_history[self.window_pos]) as i32;
        if (elapsed as u32) > STALL_GAP_US {
            self.reset(position, tick_us);
        } else if (elapsed as u32) >= SAMPLE_INTERVAL_US {
            self.window_pos = (self.window_pos + 1) & (TAPS - 1);
            self.position_delta = position - self.position_history[self.window_pos];
            self.time_delta_us = tick_us.wrapping_sub(self.tick_history[self.window_pos]) as i32;
            self.position_history[self.window_pos] = position;
            self.tick_history[self.window_pos] = tick_us;
        }
    }

    /// Counts/sec over the most recent advance, or 0 before the window has
    /// advanced at least once (or if the elapsed time rounds to zero).
    pub fn speed(&self) -> i32 {
        if self.time_delta_us == 0 {
            return 0;
        }
        ((1_000_000i64 * self.position_delta) / self.time_delta_us as i64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_estimator_reports_zero_speed() {
        let est = SpeedEstimator::new(0, 0);
        assert_eq!(est.speed(), 0);
    }

    #[test]
    fn sub_interval_updates_do_not_advance_the_window() {
        let mut est = SpeedEstimator::new(0, 0);
        est.update(100, SAMPLE_INTERVAL_US - 1);
        assert_eq!(est.speed(), 0);
    }

    #[test]
    fn update_past_interval_advances_and_reports_rate() {
        let mut est = SpeedEstimator::new(0, 0);
        // Window is full of (0, 0); advancing once compares against slot 1,
        // which still holds the initial (0, 0) sample.
        est.update(1000, SAMPLE_INTERVAL_US);
        // position_delta = 1000 - 0, time_delta = SAMPLE_INTERVAL_US - 0
        let expected = (1_000_000i64 * 1000 / SAMPLE_INTERVAL_US as i64) as i32;
        assert_eq!(est.speed(), expected);
    }

    #[test]
    fn eight_advances_complete_one_full_lap_of_the_ring() {
        let mut est = SpeedEstimator::new(0, 0);
        let mut tick = 0u32;
        let mut pos = 0i64;
        for _ in 0..8 {
            tick += SAMPLE_INTERVAL_US;
            pos += 10;
            est.update(pos, tick);
        }
        // After exactly `taps` advances, the compared-against slot has
        // wrapped back to the original reset sample (0, 0).
        let expected = (1_000_000i64 * pos / tick as i64) as i32;
        assert_eq!(est.speed(), expected);
    }

    #[test]
    fn large_gap_triggers_stall_reset() {
        let mut est = SpeedEstimator::new(0, 0);
        est.update(500, SAMPLE_INTERVAL_US);
        assert_ne!(est.speed(), 0);

        // A huge gap (stall, or a fresh restart) must zero the rate
        // instead of reporting a stale average across the gap. The gap is
        // measured from the sample at the *current* window slot (tick
        // SAMPLE_INTERVAL_US after the previous advance), not from zero.
        est.update(999_999, SAMPLE_INTERVAL_US + STALL_GAP_US + 1);
        assert_eq!(est.speed(), 0);
    }

    #[test]
    fn stationary_motor_reports_zero_speed_after_a_full_window() {
        let mut est = SpeedEstimator::new(0, 0);
        let mut tick = 0u32;
        for _ in 0..8 {
            tick += SAMPLE_INTERVAL_US;
            est.update(0, tick);
        }
        assert_eq!(est.speed(), 0);
    }
}
