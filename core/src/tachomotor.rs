// Mode state machine coupling one quadrature decoder, one H-bridge, one
// speed estimator and one PID state on a periodic tick.
//
// `ModeIntent` replaces the original's parallel `state`/`nextState` fields:
// `pending` is `Some((next_mode, threshold))` while a `goTo` trigger is
// armed, `None` once it has fired (or was never armed).
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::hbridge::HBridge;
use crate::io::{DecoderError, DigitalPin, MonotonicClock, PeriodicTicker};
use crate::pid::PidState;
use crate::quadrature::QuadratureDecoder;
use crate::speed::SpeedEstimator;

/// Tick period for `pid_tick`, matching the original `pollPeriod`.
pub const POLL_PERIOD_US: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sleep,
    Coast,
    Brake,
    Power,
    Speed,
    Track,
    Position,
}

/// A `goTo` target armed to fire the next mode transition once `duty`'s
/// sign carries the decoded position past `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionThreshold {
    pub target: i64,
}

/// Current mode plus an optional deferred transition, replacing the
/// original's `state`/`nextState` pair (see module docs).
#[derive(Debug, Clone, Copy)]
pub struct ModeIntent {
    pub current: Mode,
    pub pending: Option<(Mode, PositionThreshold)>,
}

/// The six tunable PID gains, Q16.16 fixed point. Mutated only through the
/// console's gain-adjust keys; everything else treats this as read-only.
#[derive(Debug, Clone, Copy)]
pub struct ControlConfig {
    pub speed_p: i32,
    pub speed_i: i32,
    pub speed_d: i32,
    pub position_p: i32,
    pub position_i: i32,
    pub position_d: i32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            speed_p: 1576,
            speed_i: 100,
            speed_d: 0,
            position_p: 6 * 65536,
            position_i: 0,
            position_d: 0,
        }
    }
}

fn saturate(x: i32) -> i8 {
    x.clamp(-100, 100) as i8
}

/// Owns one decoder, one H-bridge, and one periodic ticker; drives the
/// H-bridge from decoder + speed estimator via PID, per the current mode.
pub struct Tachomotor<A, B, F, R, T> {
    decoder: QuadratureDecoder<A, B>,
    bridge: HBridge<F, R>,
    ticker: T,
    speed: SpeedEstimator,
    pid: PidState,
    mode: ModeIntent,
    config: ControlConfig,
    target_position: i64,
    target_speed: i32,
    duty: i8,
    trigger_position: i64,
}

impl<A, B, F, R, T> Tachomotor<A, B, F, R, T>
where
    A: DigitalPin,
    B: DigitalPin,
    F: DigitalPin,
    R: DigitalPin,
    T: PeriodicTicker,
{
    pub fn new(decoder: QuadratureDecoder<A, B>, bridge: HBridge<F, R>, ticker: T) -> Self {
        Self {
            decoder,
            bridge,
            ticker,
            speed: SpeedEstimator::new(0, 0),
            pid: PidState::new(),
            mode: ModeIntent {
                current: Mode::Sleep,
                pending: None,
            },
            config: ControlConfig::default(),
            target_position: 0,
            target_speed: 0,
            duty: 0,
            trigger_position: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.current
    }

    pub fn duty(&self) -> i8 {
        self.duty
    }

    pub fn trigger_position(&self) -> i64 {
        self.trigger_position
    }

    pub fn target_position(&self) -> i64 {
        self.target_position
    }

    pub fn target_speed(&self) -> i32 {
        self.target_speed
    }

    pub fn position(&self) -> i64 {
        self.decoder.position()
    }

    /// Forwards a phase-A edge to the owned decoder. Called from the
    /// firmware's EXTI task for both rise and fall events; a no-op in
    /// terms of mode state, since only `pid_tick` ever reads the decoded
    /// position back into the control loop.
    pub fn on_phase_a_edge(&mut self, new_level: bool, timestamp_us: u32) {
        self.decoder.on_edge(new_level, timestamp_us);
    }

    pub fn speed(&self) -> i32 {
        self.speed.speed()
    }

    pub fn pid_state(&self) -> PidState {
        self.pid
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ControlConfig {
        &mut self.config
    }

    /// Stops the tick and decoder and coasts the bridge. Always succeeds;
    /// a no-op if already asleep.
    pub fn sleep(&mut self) {
        if self.mode.current != Mode::Sleep {
            self.duty = 0;
            self.bridge.coast();
            self.ticker.detach();
            self.decoder.stop();
        }
        self.mode = ModeIntent {
            current: Mode::Sleep,
            pending: None,
        };
    }

    pub fn coast(&mut self, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        self.enter(Mode::Coast, clock)
    }

    pub fn brake(&mut self, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        self.enter(Mode::Brake, clock)
    }

    /// Drives the H-bridge at a fixed `duty` (slow-decay), entering POWER.
    pub fn go(&mut self, duty: i8, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        self.duty = duty;
        self.enter(Mode::Power, clock)
    }

    /// Enters SPEED mode, running PID against `target_speed` (counts/s).
    pub fn go_at(&mut self, target_speed: i32, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        self.target_speed = target_speed;
        self.enter(Mode::Speed, clock)
    }

    /// Arms a position trigger: seeds `duty` to +-100 toward `target`,
    /// enters POWER, and arms the deferred transition to `Mode::Brake`
    /// once the decoded position crosses `target`.
    pub fn go_to(&mut self, target: i64, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        self.go_to_then(target, Mode::Brake, clock)
    }

    /// As `go_to`, but the deferred transition lands on `then` instead of
    /// the default `Mode::Brake`.
    pub fn go_to_then(
        &mut self,
        target: i64,
        then: Mode,
        clock: &impl MonotonicClock,
    ) -> Result<(), DecoderError> {
        let p = self.decoder.position();
        if p < target {
            self.duty = 100;
        } else if target < p {
            self.duty = -100;
        }
        self.target_position = target;
        self.enter(Mode::Power, clock)?;
        self.mode.pending = Some((then, PositionThreshold { target }));
        Ok(())
    }

    /// Runs one control period: poll the decoder, update the speed
    /// estimate, resolve any armed position trigger, then dispatch PID by
    /// mode. Called from the firmware's `POLL_PERIOD_US` timer task.
    pub fn pid_tick(&mut self, now_us: u32) {
        let p = self.decoder.poll();
        self.speed.update(p, now_us);
        let q = self.speed.speed();

        if let Some((next, threshold)) = self.mode.pending {
            let crossed =
                (self.duty > 0 && p >= threshold.target) || (self.duty < 0 && p <= threshold.target);
            if crossed {
                let old_mode = self.mode.current;
                self.trigger_position = p;
                self.mode.pending = None;
                self.mode.current = next;
                self.apply_mode_effects(old_mode, next);
                #[cfg(feature = "log")]
                defmt::info!("position trigger fired at {}, transitioning mode", p);
            }
        }

        match self.mode.current {
            Mode::Speed => {
                self.pid.update(self.target_speed as i64, q as i64);
                self.duty = saturate(self.pid.output(
                    self.config.speed_p,
                    self.config.speed_i,
                    self.config.speed_d,
                ));
                self.bridge.power_slow_decay(self.duty);
            }
            Mode::Track | Mode::Position => {
                self.pid.update(self.target_position, p);
                self.duty = saturate(self.pid.output(
                    self.config.position_p,
                    self.config.position_i,
                    self.config.position_d,
                ));
                self.bridge.power_slow_decay(self.duty);
            }
            _ => {}
        }
    }

    /// Shared plumbing for every command that may need to wake the
    /// decoder and tick from SLEEP before applying the mode's own effects.
    fn enter(&mut self, mode: Mode, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        let old_mode = self.mode.current;
        if old_mode == Mode::Sleep && mode != Mode::Sleep {
            if let Err(err) = self.decoder.start(clock) {
                #[cfg(feature = "log")]
                defmt::warn!("tachomotor enter() could not start decoder: {}", err as u8);
                return Err(err);
            }
            self.ticker.attach_us(POLL_PERIOD_US);
        }
        self.mode = ModeIntent {
            current: mode,
            pending: None,
        };
        self.apply_mode_effects(old_mode, mode);
        Ok(())
    }

    /// Applies `mode`'s entry effects. `old` is the mode being left; the PID
    /// is reset only when `old != mode`, so re-issuing a command for the
    /// mode already in effect (e.g. a second `go_at()` while already in
    /// SPEED) doesn't wipe `sigma`/`delta` mid-control.
    fn apply_mode_effects(&mut self, old: Mode, mode: Mode) {
        match mode {
            Mode::Sleep => {}
            Mode::Coast => {
                self.duty = 0;
                self.bridge.coast();
            }
            Mode::Brake => {
                self.duty = 0;
                self.bridge.brake();
            }
            Mode::Power => {
                self.bridge.power_slow_decay(self.duty);
            }
            Mode::Speed | Mode::Track => {
                if old != mode {
                    self.pid.reset();
                }
            }
            Mode::Position => {
                self.bridge.brake();
                if old != mode {
                    self.pid.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadrature::TEST_HARDWARE_CLOCK_LOCK;

    #[derive(Default)]
    struct MockPin {
        digital: bool,
        analog: Option<u16>,
    }
    impl DigitalPin for MockPin {
        fn set_digital(&mut self, high: bool) {
            self.digital = high;
            self.analog = None;
        }
        fn get_digital(&self) -> bool {
            self.digital
        }
        fn set_analog(&mut self, raw_duty: u16) {
            self.analog = Some(raw_duty);
        }
        fn set_analog_period_us(&mut self, _period_us: u32) {}
    }

    struct FakeClock(u32);
    impl MonotonicClock for FakeClock {
        fn now_us(&self) -> u32 {
            self.0
        }
    }

    #[derive(Default)]
    struct MockTicker {
        attached: bool,
        period_us: u32,
        attach_count: u32,
        detach_count: u32,
    }
    impl PeriodicTicker for MockTicker {
        fn attach_us(&mut self, period_us: u32) {
            self.attached = true;
            self.period_us = period_us;
            self.attach_count += 1;
        }
        fn detach(&mut self) {
            self.attached = false;
            self.detach_count += 1;
        }
    }

    type TestMotor = Tachomotor<MockPin, MockPin, MockPin, MockPin, MockTicker>;

    fn motor() -> TestMotor {
        Tachomotor::new(
            QuadratureDecoder::new(MockPin::default(), MockPin::default()),
            HBridge::new(MockPin::default(), MockPin::default(), 100),
            MockTicker::default(),
        )
    }

    #[test]
    fn go_then_sleep_drives_power_then_coasts_and_tears_down() {
        let _guard = TEST_HARDWARE_CLOCK_LOCK.lock().unwrap();
        let mut m = motor();
        let clock = FakeClock(0);

        m.go(50, &clock).unwrap();
        assert_eq!(m.mode(), Mode::Power);
        assert_eq!(m.duty(), 50);
        assert!(m.ticker.attached);
        assert!(m.decoder.is_attached());

        m.sleep();
        assert_eq!(m.mode(), Mode::Sleep);
        assert_eq!(m.duty(), 0);
        assert!(!m.ticker.attached);
        assert_eq!(m.ticker.detach_count, 1);
        assert!(!m.decoder.is_attached());
    }

    #[test]
    fn go_to_arms_trigger_and_fires_on_crossing() {
        let _guard = TEST_HARDWARE_CLOCK_LOCK.lock().unwrap();
        let mut m = motor();
        let clock = FakeClock(0);

        m.go_to(720, &clock).unwrap();
        assert_eq!(m.mode(), Mode::Power);
        assert_eq!(m.duty(), 100);
        assert!(m.mode.pending.is_some());

        // Drive the decoder to report increasing positions across ticks.
        for (i, pos) in [0i64, 100, 300, 600, 720, 720].into_iter().enumerate() {
            m.decoder.reset_position(pos);
            m.pid_tick(2000 * (i as u32 + 1));
        }

        assert_eq!(m.mode(), Mode::Brake);
        assert_eq!(m.trigger_position(), 720);
    }

    #[test]
    fn second_start_while_sleeping_propagates_busy() {
        let _guard = TEST_HARDWARE_CLOCK_LOCK.lock().unwrap();
        let mut m1 = motor();
        let mut m2 = motor();
        let clock = FakeClock(0);

        m1.go(10, &clock).unwrap();
        assert_eq!(m2.go(10, &clock), Err(DecoderError::Busy));

        m1.sleep();
        assert!(m2.go(10, &clock).is_ok());
        m2.sleep();
    }

    #[test]
    fn speed_mode_runs_pid_and_saturates_duty() {
        let _guard = TEST_HARDWARE_CLOCK_LOCK.lock().unwrap();
        let mut m = motor();
        let clock = FakeClock(0);
        m.go_at(-720, &clock).unwrap();
        assert_eq!(m.mode(), Mode::Speed);

        m.pid_tick(2000);
        assert!(m.duty() >= -100 && m.duty() <= 100);
        m.sleep();
    }
}
