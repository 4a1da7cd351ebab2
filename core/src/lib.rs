#![no_std]

// Unit tests below use `std::sync::Mutex`/`std::string::String` as host-side
// test scaffolding; `no_std` otherwise removes `std` from the extern prelude.
#[cfg(test)]
extern crate std;

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

//! Closed-loop tachometer DC motor control core: the interrupt-driven
//! software quadrature decoder, its windowed speed estimator, the
//! fixed-point PID controller, H-bridge modulation, and the mode state
//! machine (`Tachomotor`) that couples them on a periodic tick.
//!
//! This crate owns only the algorithm; GPIO, PWM, the monotonic clock and
//! the periodic ticker are narrow traits in [`io`] that firmware (the
//! `drivers`/`app` crates) implements against real hardware, and that
//! host-side tests implement in memory.

pub mod console;
pub mod hbridge;
pub mod io;
pub mod pid;
pub mod quadrature;
pub mod speed;
pub mod tachomotor;

pub use hbridge::HBridge;
pub use io::{DecoderError, DigitalPin, MonotonicClock, PeriodicTicker};
pub use pid::PidState;
pub use quadrature::QuadratureDecoder;
pub use speed::SpeedEstimator;
pub use tachomotor::{ControlConfig, Mode, Tachomotor};
