// Interrupt-driven software quadrature decoder.
//
// Edges on phase A only are the interrupt source; phase B is sampled by a
// level read inside the edge handler. The handler infers direction from the
// pair (A, B) and keeps a 32-bit working counter whose bottom two bits
// always mirror the latched A level, tolerating dropped edges by design
// (see `on_edge` below). `poll()` reconstructs the exported 64-bit position
// from that counter and a fresh read of B.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::sync::atomic::{AtomicBool, Ordering};

use crate::io::{DecoderError, DigitalPin, MonotonicClock};

/// Models "only one decoder may be attached to the hardware clock pin at a
/// time" (§3 Lifecycles) independent of how many `QuadratureDecoder`
/// instances have been constructed.
static HARDWARE_CLOCK_CLAIMED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachState {
    Detached,
    Attached,
}

/// Software quadrature decoder over phase pins `A` (edge source) and `B`
/// (level-sampled on each A edge).
pub struct QuadratureDecoder<A, B> {
    phase_a: A,
    phase_b: B,
    state: AttachState,

    /// 32-bit working counter. Bits above bit 1 are the count; bits 0-1
    /// always equal `latched_a * 3` (`00` or `11`).
    countstate: i32,

    /// Timestamps of the most recent "significant" edge and the one
    /// before it, kept for diagnostics only (never exported).
    livestamp: u32,
    latchstamp: u32,

    /// Exported 64-bit position, read/written under a critical section so
    /// foreground readers never observe a torn 64-bit value.
    position: i64,
}

impl<A: DigitalPin, B: DigitalPin> QuadratureDecoder<A, B> {
    /// Constructs a decoder. Inert until `start()`: no edges are observed
    /// and no hardware clock pin is claimed yet.
    pub fn new(phase_a: A, phase_b: B) -> Self {
        Self {
            phase_a,
            phase_b,
            state: AttachState::Detached,
            countstate: 0,
            livestamp: 0,
            latchstamp: 0,
            position: 0,
        }
    }

    /// Subscribes to rise/fall edges on phase A and claims the hardware
    /// clock pin. Fails with `Busy` if another instance already holds it.
    pub fn start(&mut self, clock: &impl MonotonicClock) -> Result<(), DecoderError> {
        if self.state == AttachState::Attached {
            return Ok(());
        }
        if HARDWARE_CLOCK_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            #[cfg(feature = "log")]
            defmt::warn!("quadrature decoder start() rejected: hardware clock pin busy");
            return Err(DecoderError::Busy);
        }
        let now = clock.now_us();
        self.livestamp = now;
        self.latchstamp = now;
        self.state = AttachState::Attached;
        #[cfg(feature = "log")]
        defmt::info!("quadrature decoder attached at {}us", now);
        Ok(())
    }

    /// Unsubscribes and releases the hardware clock pin. Never fails.
    pub fn stop(&mut self) {
        if self.state == AttachState::Attached {
            HARDWARE_CLOCK_CLAIMED.store(false, Ordering::Release);
            self.state = AttachState::Detached;
            #[cfg(feature = "log")]
            defmt::info!("quadrature decoder detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state == AttachState::Attached
    }

    /// Called from the edge ISR for both rise and fall events on phase A.
    /// By hardware convention the stored polarity is inverted: `stored_a =
    /// !new_level`.
    pub fn on_edge(&mut self, new_level: bool, timestamp_us: u32) {
        let a = !new_level;
        let b = self.phase_b.get_digital();
        self.countstate = Self::update_countstate(self.countstate, a, b);

        if !b {
            // Counted edge: the time between successive B==0 edges is an
            // immediate speed proxy, kept for diagnostics only.
            self.latchstamp = self.livestamp;
            self.livestamp = timestamp_us;
        } else {
            // Minor half of the quadrature cycle; timestamps roll without
            // a count change.
            self.latchstamp = self.livestamp;
        }
    }

    /// `countstate += 1 - 2*a` when `b == 0`, then re-latch the bottom two
    /// bits to `a * 3`.
    fn update_countstate(state: i32, a: bool, b: bool) -> i32 {
        let mut state = state;
        if !b {
            state = state.wrapping_add(1 - 2 * a as i32);
        }
        (state & !3) | (a as i32 * 3)
    }

    /// Reconstructs the exported position from the working counter and a
    /// fresh phase-B read. Idempotent between edges; must be called at
    /// least once per maximum-expected-count-rate window (<=100 ms is safe
    /// under 10 kHz).
    pub fn poll(&mut self) -> i64 {
        let b = self.phase_b.get_digital();
        let current = self.countstate ^ (b as i32);
        critical_section::with(|_| {
            self.position += (current - self.position as i32) as i64;
        });
        self.position()
    }

    /// Sets the exported position to `p`. The counter's high bits follow
    /// `p`; its low two bits follow the current phase-A level.
    pub fn reset_position(&mut self, p: i64) {
        let a = self.phase_a.get_digital();
        self.countstate = ((p as i32) & !3) | (a as i32 * 3);
        critical_section::with(|_| {
            self.position = p;
        });
    }

    /// Coherent read of the exported position, safe to call from the
    /// foreground while `poll()` may be running from the tick context.
    pub fn position(&self) -> i64 {
        critical_section::with(|_| self.position)
    }
}

/// Releases the hardware clock claim if still attached, so a decoder that
/// is simply dropped (rather than explicitly `stop()`-ed) never leaves the
/// hardware clock pin permanently unavailable to the next instance.
impl<A, B> Drop for QuadratureDecoder<A, B> {
    fn drop(&mut self) {
        if self.state == AttachState::Attached {
            HARDWARE_CLOCK_CLAIMED.store(false, Ordering::Release);
        }
    }
}

/// Serializes tests that exercise `HARDWARE_CLOCK_CLAIMED`: the claim is a
/// process-wide static, so concurrently-running `#[test]` functions in any
/// module must not call `start()` without holding this lock.
#[cfg(test)]
pub(crate) static TEST_HARDWARE_CLOCK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
