#![no_std]

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

//! `stm32-hal2` wiring for `tachocore`: pin definitions for the quadrature
//! encoder and H-bridge, and implementations of `tachocore::io`'s
//! `DigitalPin`/`MonotonicClock`/`PeriodicTicker` traits against real
//! peripherals.

pub mod clock;
pub mod gpio;
pub mod pinout;
pub mod ticker;

pub use clock::CycleCounterClock;
pub use gpio::{EncoderInputPin, HBridgePwmPin};
pub use ticker::TimerTicker;
