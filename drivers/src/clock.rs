// `MonotonicClock` backed by the Cortex-M cycle counter (DWT->CYCCNT),
// scaled to a free-running microsecond count. Matches spec §6's 32-bit
// wraparound contract directly, since `CYCCNT` is itself a wrapping u32.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use cortex_m::peripheral::DWT;
use tachocore::MonotonicClock;

/// Reads `DWT->CYCCNT` and divides by the core clock in MHz to produce a
/// free-running microsecond counter. Requires the DWT cycle counter to
/// have been enabled at board bring-up (`DWT::unlock()` +
/// `dwt.enable_cycle_counter()`).
///
/// Stateless besides the fixed clock divisor, so it's cheap to copy one
/// instance into each RTIC task's local resources rather than share a
/// single instance as an exclusively-owned resource.
#[derive(Clone, Copy)]
pub struct CycleCounterClock {
    core_clock_mhz: u32,
}

impl CycleCounterClock {
    pub fn new(core_clock_hz: u32) -> Self {
        Self {
            core_clock_mhz: core_clock_hz / 1_000_000,
        }
    }
}

impl MonotonicClock for CycleCounterClock {
    fn now_us(&self) -> u32 {
        DWT::cycle_count() / self.core_clock_mhz
    }
}
