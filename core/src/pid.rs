// Fixed-point PID accumulator: error/sigma/delta state plus a Q16.16
// weighted-sum output, matching the original `PIDState` exactly.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Deadband applied to `error` before it accumulates into `sigma`: any
/// error strictly between `-HYSTERESIS` and `HYSTERESIS` is treated as
/// zero, so small tracking noise doesn't wind up the integral term.
pub const HYSTERESIS: i32 = 3;

/// PID state for one control loop: current error, accumulated error
/// (`sigma`), and the error's delta from the previous tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    pub error: i32,
    pub sigma: i64,
    pub delta: i32,
}

impl PidState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears accumulated state. Called on every transition into a
    /// closed-loop mode so the integral term doesn't carry stale history.
    pub fn reset(&mut self) {
        self.error = 0;
        self.sigma = 0;
        self.delta = 0;
    }

    /// Advances the state by one tick given `target` and `current` in the
    /// same units (position ticks or speed ticks/sec).
    pub fn update(&mut self, target: i64, current: i64) {
        let old_error = self.error;
        let mut error = (target - current) as i32;
        if error > -HYSTERESIS && error < HYSTERESIS {
            error = 0;
        }
        self.error = error;
        self.sigma += error as i64;
        self.delta = error - old_error;
    }

    /// `(p*error + i*sigma + d*delta) >> 16`, saturated to `i32` range.
    pub fn output(&self, p: i32, i: i32, d: i32) -> i32 {
        let sum = (p as i64 * self.error as i64)
            + (i as i64 * self.sigma)
            + (d as i64 * self.delta as i64);
        let sum = sum >> 16;
        sum.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_error_is_absorbed_by_hysteresis() {
        let mut pid = PidState::new();
        pid.update(2, 0); // error = 2, within (-3, 3)
        assert_eq!(pid.error, 0);
        assert_eq!(pid.sigma, 0);
        assert_eq!(pid.delta, 0);
    }

    #[test]
    fn error_outside_hysteresis_accumulates() {
        let mut pid = PidState::new();
        pid.update(10, 0); // error = 10
        assert_eq!(pid.error, 10);
        assert_eq!(pid.sigma, 10);
        assert_eq!(pid.delta, 10);

        pid.update(10, 4); // error = 6
        assert_eq!(pid.error, 6);
        assert_eq!(pid.sigma, 16);
        assert_eq!(pid.delta, -4);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut pid = PidState::new();
        pid.update(100, 0);
        pid.reset();
        assert_eq!(pid.error, 0);
        assert_eq!(pid.sigma, 0);
        assert_eq!(pid.delta, 0);
    }

    #[test]
    fn output_applies_q16_16_scale_and_shift() {
        let mut pid = PidState::new();
        pid.update(100, 0); // error=100, sigma=100, delta=100
        let p = 6 * 65536; // matches the original positionP default
        let out = pid.output(p, 0, 0);
        assert_eq!(out, 600); // (6<<16 * 100) >> 16 == 6*100
    }

    #[test]
    fn output_saturates_at_i32_bounds() {
        let mut pid = PidState::new();
        pid.update(1_000_000, 0);
        let out = pid.output(i32::MAX, i32::MAX, i32::MAX);
        assert_eq!(out, i32::MAX);

        let mut pid2 = PidState::new();
        pid2.update(-1_000_000, 0);
        let out2 = pid2.output(i32::MAX, i32::MAX, i32::MAX);
        assert_eq!(out2, i32::MIN);
    }
}
