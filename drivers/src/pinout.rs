// Pin definitions for the quadrature encoder's two phases and the
// H-bridge's two drive lines, in the teacher's `PinDef` + `.init()` style
// (see `dresio-TunePulse-RS`'s `pinout` module).
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::gpio::{Pin, PinMode, Port};

/// Declarative GPIO pin definition, materialized into a live `Pin` by
/// `init()` at board bring-up.
pub struct PinDef {
    port: Port,
    pin: u8,
    mode: PinMode,
}

impl PinDef {
    pub const fn new(port: Port, pin: u8, mode: PinMode) -> PinDef {
        PinDef { port, pin, mode }
    }

    /// Converts the definition to a live `Pin`.
    pub fn init(&self) -> Pin {
        Pin::new(self.port, self.pin, self.mode)
    }
}

/// Phase A of the quadrature encoder. This is the single EXTI-capable
/// "safe clock pin" the decoder subscribes rise/fall interrupts on (see
/// spec §4.2): only one hardware pin is available for edge interrupts on
/// the target board, which is why the decoder infers direction from a
/// level read of phase B rather than also interrupting on it.
pub const ENCODER_PHASE_A: PinDef = PinDef::new(Port::A, 8, PinMode::Input);

/// Phase B of the quadrature encoder, sampled by level read only; never
/// wired to an interrupt.
pub const ENCODER_PHASE_B: PinDef = PinDef::new(Port::A, 9, PinMode::Input);

/// H-bridge forward drive line. Alternate-function mode so it can be
/// reconfigured to PWM (`TIM2` channel, see `gpio::HBridgePwmPin`) or
/// driven statically at saturation.
pub const HBRIDGE_FORWARD: PinDef = PinDef::new(Port::B, 4, PinMode::Alt(1));

/// H-bridge reverse drive line, same timer as `HBRIDGE_FORWARD` on a
/// different channel.
pub const HBRIDGE_REVERSE: PinDef = PinDef::new(Port::B, 5, PinMode::Alt(1));
