// Operator console: renders the tuning readout the original `main.cpp`
// printed over a serial port, and maps single-key presses to tachomotor
// commands. Formatting goes through `core::fmt::Write` so the firmware can
// hand it any serial sink; this crate never assumes a particular UART.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::fmt::{self, Write};

use crate::io::{DigitalPin, MonotonicClock, PeriodicTicker};
use crate::tachomotor::{Mode, Tachomotor};

/// Refresh cadence for the console readout, matching the original's
/// `wait_ms(49)` loop (~20 Hz).
pub const REFRESH_PERIOD_US: u32 = 49_000;

/// The ten preset commands bound to keys `0`..`9`, in the original's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Sleep,
    Coast,
    Brake,
    Go85,
    GoAtMinus720,
    GoAtMinus1440,
    GoToZero,
    GoToMinus720Position,
    GoToZeroPosition,
    GoTo720Position,
}

impl Preset {
    /// Maps a key press to a preset command, or `None` for any other key.
    pub fn from_key(key: u8) -> Option<Self> {
        match key {
            b'0' => Some(Self::Sleep),
            b'1' => Some(Self::Coast),
            b'2' => Some(Self::Brake),
            b'3' => Some(Self::Go85),
            b'4' => Some(Self::GoAtMinus720),
            b'5' => Some(Self::GoAtMinus1440),
            b'6' => Some(Self::GoToZero),
            b'7' => Some(Self::GoToMinus720Position),
            b'8' => Some(Self::GoToZeroPosition),
            b'9' => Some(Self::GoTo720Position),
            _ => None,
        }
    }

    /// The echoed command string shown on the next refresh, matching the
    /// original's `command` variable.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Coast => "coast",
            Self::Brake => "brake",
            Self::Go85 => "go(85)",
            Self::GoAtMinus720 => "goAt(-720)",
            Self::GoAtMinus1440 => "goAt(-1440)",
            Self::GoToZero => "goTo(0)",
            Self::GoToMinus720Position => "goTo(-720, POSITION)",
            Self::GoToZeroPosition => "goTo(0, POSITION)",
            Self::GoTo720Position => "goTo(720, POSITION)",
        }
    }

    /// Dispatches this preset against a tachomotor. The `Coast`/`Brake`/
    /// `GoToZero` presets default `then` to `Mode::Brake` as the original
    /// does for a bare `goTo(x)` call.
    pub fn dispatch<A, B, F, R, T>(
        &self,
        motor: &mut Tachomotor<A, B, F, R, T>,
        clock: &impl MonotonicClock,
    ) -> Result<(), crate::io::DecoderError>
    where
        A: DigitalPin,
        B: DigitalPin,
        F: DigitalPin,
        R: DigitalPin,
        T: PeriodicTicker,
    {
        match self {
            Self::Sleep => {
                motor.sleep();
                Ok(())
            }
            Self::Coast => motor.coast(clock),
            Self::Brake => motor.brake(clock),
            Self::Go85 => motor.go(85, clock),
            Self::GoAtMinus720 => motor.go_at(-720, clock),
            Self::GoAtMinus1440 => motor.go_at(-1440, clock),
            Self::GoToZero => motor.go_to(0, clock),
            Self::GoToMinus720Position => motor.go_to_then(-720, Mode::Position, clock),
            Self::GoToZeroPosition => motor.go_to_then(0, Mode::Position, clock),
            Self::GoTo720Position => motor.go_to_then(720, Mode::Position, clock),
        }
    }
}

/// Direction a gain-adjust key moves a PID gain, and which gain it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainKey {
    PositionPUp,
    PositionPDown,
    PositionIUp,
    PositionIDown,
    PositionDUp,
    PositionDDown,
}

impl GainKey {
    /// `p`/`P`, `i`/`I`, `d`/`D` increment/decrement `positionP`/`I`/`D`.
    /// Any other key returns `None`.
    pub fn from_key(key: u8) -> Option<Self> {
        match key {
            b'p' => Some(Self::PositionPUp),
            b'P' => Some(Self::PositionPDown),
            b'i' => Some(Self::PositionIUp),
            b'I' => Some(Self::PositionIDown),
            b'd' => Some(Self::PositionDUp),
            b'D' => Some(Self::PositionDDown),
            _ => None,
        }
    }

    /// Applies the step to the targeted gain. Step size is
    /// `max(|gain| / 32, 1)`, matching the original's `pstep`/`istep`/
    /// `dstep` computed fresh each console refresh.
    pub fn apply<A, B, F, R, T>(&self, motor: &mut Tachomotor<A, B, F, R, T>)
    where
        A: DigitalPin,
        B: DigitalPin,
        F: DigitalPin,
        R: DigitalPin,
        T: PeriodicTicker,
    {
        fn step(gain: i32) -> i32 {
            (gain.abs() / 32).max(1)
        }
        let config = motor.config_mut();
        match self {
            Self::PositionPUp => config.position_p += step(config.position_p),
            Self::PositionPDown => config.position_p -= step(config.position_p),
            Self::PositionIUp => config.position_i += step(config.position_i),
            Self::PositionIDown => config.position_i -= step(config.position_i),
            Self::PositionDUp => config.position_d += step(config.position_d),
            Self::PositionDDown => config.position_d -= step(config.position_d),
        }
    }
}

/// Tracks the last command label echoed on the console, since the
/// tachomotor itself has no notion of "what was last typed".
#[derive(Debug, Clone, Copy)]
pub struct Console {
    last_command: &'static str,
}

impl Default for Console {
    fn default() -> Self {
        Self { last_command: "" }
    }
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one key of operator input. Presets and gain-adjust keys are
    /// mutually exclusive per the original's `switch`; any other byte is
    /// ignored.
    pub fn handle_key<A, B, F, R, T>(
        &mut self,
        key: u8,
        motor: &mut Tachomotor<A, B, F, R, T>,
        clock: &impl MonotonicClock,
    ) where
        A: DigitalPin,
        B: DigitalPin,
        F: DigitalPin,
        R: DigitalPin,
        T: PeriodicTicker,
    {
        if let Some(preset) = Preset::from_key(key) {
            self.last_command = preset.label();
            let _ = preset.dispatch(motor, clock);
        } else if let Some(gain_key) = GainKey::from_key(key) {
            gain_key.apply(motor);
        }
    }

    /// Renders the ~20 Hz readout: command echo, position, speed, PID
    /// error/sigma/delta, target position, target speed, duty, trigger
    /// position, and the three position gains. ANSI cursor-home
    /// (`\033[1;1H`) precedes the frame and `\033[K` clears each line, both
    /// matching the original's `printf` format string exactly.
    pub fn render<A, B, F, R, T>(
        &self,
        out: &mut impl Write,
        motor: &Tachomotor<A, B, F, R, T>,
    ) -> fmt::Result
    where
        A: DigitalPin,
        B: DigitalPin,
        F: DigitalPin,
        R: DigitalPin,
        T: PeriodicTicker,
    {
        let position = motor.position();
        let speed = motor.speed();
        let pid = motor.pid_state();
        let target = motor.target_position();
        let target_speed = motor.target_speed();
        let duty = motor.duty();
        let config = motor.config();

        write!(out, "\x1b[1;1H{}\x1b[K\r\n", self.last_command)?;
        write!(
            out,
            "position: {:6}       speed: {:5}      error: {:6}        mode: {}  \x1b[K\r\n",
            position,
            speed,
            pid.error,
            mode_label(motor.mode()),
        )?;
        write!(
            out,
            "  target: {:6}      target: {:5}      sigma: {:6}       power: {:5}  \x1b[K\r\n",
            target, target_speed, pid.sigma, duty,
        )?;
        write!(
            out,
            "   error: {:6}       error: {:5}      delta: {:6}  \x1b[K\r\n",
            position - target,
            speed - target_speed,
            pid.delta,
        )?;
        write!(out, " tripped: {:6}  \x1b[K\r\n\x1b[K\r\n", motor.trigger_position())?;
        write!(
            out,
            "    posP: {:8}    posI: {:8}    posD: {:8}  \x1b[K\r\n\x1b[K\r\n",
            config.position_p, config.position_i, config.position_d,
        )
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Sleep => "SLEEP",
        Mode::Coast => "COAST",
        Mode::Brake => "BRAKE",
        Mode::Power => "POWER",
        Mode::Speed => "SPEED",
        Mode::Track => "TRACK",
        Mode::Position => "POSITION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbridge::HBridge;
    use crate::quadrature::{QuadratureDecoder, TEST_HARDWARE_CLOCK_LOCK};

    #[derive(Default)]
    struct MockPin {
        digital: bool,
    }
    impl DigitalPin for MockPin {
        fn set_digital(&mut self, high: bool) {
            self.digital = high;
        }
        fn get_digital(&self) -> bool {
            self.digital
        }
        fn set_analog(&mut self, _raw_duty: u16) {}
        fn set_analog_period_us(&mut self, _period_us: u32) {}
    }

    struct FakeClock(u32);
    impl MonotonicClock for FakeClock {
        fn now_us(&self) -> u32 {
            self.0
        }
    }

    #[derive(Default)]
    struct MockTicker;
    impl PeriodicTicker for MockTicker {
        fn attach_us(&mut self, _period_us: u32) {}
        fn detach(&mut self) {}
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
    fn preset_key_dispatches_and_echoes_label() {
        let _guard = TEST_HARDWARE_CLOCK_LOCK.lock().unwrap();
        let mut m = motor();
        let mut console = Console::new();
        let clock = FakeClock(0);
        console.handle_key(b'3', &mut m, &clock); // go(85)
        assert_eq!(m.mode(), Mode::Power);
        assert_eq!(m.duty(), 85);
        assert_eq!(console.last_command, "go(85)");
        m.sleep();
    }

    #[test]
    fn gain_key_increments_position_p_by_at_least_one() {
        let mut m = motor();
        let before = m.config().position_p;
        let mut console = Console::new();
        let clock = FakeClock(0);
        console.handle_key(b'p', &mut m, &clock);
        assert!(m.config().position_p > before);
    }

    #[test]
    fn unrecognized_key_is_ignored() {
        let mut m = motor();
        let mut console = Console::new();
        let clock = FakeClock(0);
        console.handle_key(b'z', &mut m, &clock);
        assert_eq!(m.mode(), Mode::Sleep);
    }

    #[test]
    fn render_produces_ansi_home_prefixed_frame() {
        let m = motor();
        let console = Console::new();
        let mut buf = heapless_string_stub::Buf::new();
        console.render(&mut buf, &m).unwrap();
        assert!(buf.0.starts_with("\x1b[1;1H"));
        assert!(buf.0.contains("mode: SLEEP"));
    }

    /// A minimal `core::fmt::Write` sink for the render test, standing in
    /// for the `heapless::String`/embedded serial buffer the firmware uses.
    mod heapless_string_stub {
        use core::fmt;

        pub struct Buf(pub std::string::String);
        impl Buf {
            pub fn new() -> Self {
                Self(std::string::String::new())
            }
        }
        impl fmt::Write for Buf {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                self.0.push_str(s);
                Ok(())
            }
        }
    }
}
